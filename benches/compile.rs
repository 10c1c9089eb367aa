//! This bench compiles a generated source tree of tactics, techniques and case
//! studies, with templates linking case studies back to techniques.

#![allow(missing_docs)]

use std::{fmt::Write as _, fs, path::Path};

use atlas::MatrixCompiler;
use criterion::{Criterion, criterion_group, criterion_main};
use tempfile::TempDir;

const TACTICS: usize = 12;
const TECHNIQUES: usize = 100;
const CASE_STUDIES: usize = 50;

/// Generates a matrix with anchored tactics and techniques
fn preseed_directory(root: &Path) {
    let mut matrix = String::from("---\nid: BENCH\nname: Bench Matrix\nversion: 1.0.0\ntactics:\n");
    let mut tactics = String::new();
    for t in 0..TACTICS {
        writeln!(matrix, "  - \"{{{{ta{t}.id}}}}\"").unwrap();
        write!(
            tactics,
            "- &ta{t}\n  id: AML.TA{t:04}\n  object-type: tactic\n  name: Tactic {t}\n  description: Tactic number {t}.\n"
        )
        .unwrap();
    }
    matrix.push_str(
        "data:\n  - !include tactics.yaml\n  - !include techniques.yaml\n  - !include case-studies/*.yaml\n",
    );

    let mut techniques = String::new();
    for n in 0..TECHNIQUES {
        let t = n % TACTICS;
        write!(
            techniques,
            "- &te{n}\n  id: AML.T{n:04}\n  object-type: technique\n  name: Technique {n}\n  description: Used during {{{{ta{t}.name}}}} (see [{n}]).\n  tactics:\n    - \"{{{{ta{t}.id}}}}\"\n"
        )
        .unwrap();
    }

    fs::create_dir_all(root.join("case-studies")).unwrap();
    for n in 0..CASE_STUDIES {
        let te = n % TECHNIQUES;
        let t = te % TACTICS;
        let study = format!(
            "id: AML.CS{n:04}\nobject-type: case-study\nname: Study {n}\nsummary: Abuse of {{{{te{te}.name}}}}.\nincident-date: 2023-01-01\nincident-date-granularity: YEAR\nprocedure:\n  - tactic: \"{{{{ta{t}.id}}}}\"\n    technique: \"{{{{te{te}.id}}}}\"\n    description: Step one.\nreported-by: Bench\n"
        );
        fs::write(root.join(format!("case-studies/AML.CS{n:04}.yaml")), study).unwrap();
    }

    fs::write(root.join("matrix.yaml"), matrix).unwrap();
    fs::write(root.join("tactics.yaml"), tactics).unwrap();
    fs::write(root.join("techniques.yaml"), techniques).unwrap();
}

fn compile(c: &mut Criterion) {
    let tmp_dir = TempDir::new().unwrap();
    preseed_directory(tmp_dir.path());
    let compiler = MatrixCompiler::new(tmp_dir.path().join("matrix.yaml"));

    c.bench_function("compile matrix", |b| {
        b.iter(|| {
            let compiled = compiler.compile().unwrap();
            assert!(compiled.report().is_clean());
            compiled.to_json().unwrap()
        });
    });
}

criterion_group!(benches, compile);
criterion_main!(benches);
