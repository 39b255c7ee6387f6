use assert_cmd::Command;
use classport::core::config::DEFAULT_ENTRY_DESCRIPTOR;
use classport::core::TableBuilder;
use classport_parser::write_class;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// `app/Main.main` calls `app/Util.helper`; `app/Unused` is dead.
fn input_dir(with_native: bool) -> TempDir {
    let mut builder = TableBuilder::new();
    {
        let mut main = builder.class("app/Main");
        if with_native {
            main.native_method("tick", "()I").unwrap();
        }
        let mut m = main.static_method("main", DEFAULT_ENTRY_DESCRIPTOR);
        m.invoke_static("app/Util", "helper", "()I").pop();
        if with_native {
            m.invoke_static("app/Main", "tick", "()I").pop();
        }
        m.return_void();
        m.build().unwrap();
        main.build().unwrap();
    }
    for name in ["app/Util", "app/Unused"] {
        let mut class = builder.class(name);
        let mut m = class.static_method("helper", "()I");
        m.iconst(1).ireturn();
        m.build().unwrap();
        class.build().unwrap();
    }
    let table = builder.finish();

    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("app")).unwrap();
    for (_, class) in table.iter() {
        fs::write(
            dir.path().join(format!("{}.class", class.name)),
            write_class(class).unwrap(),
        )
        .unwrap();
    }
    dir
}

fn classport() -> Command {
    Command::cargo_bin("classport").unwrap()
}

#[test]
fn test_translate_writes_output() {
    let input = input_dir(false);
    let out = tempfile::tempdir().unwrap();

    classport()
        .arg("translate")
        .arg(input.path())
        .arg("-o")
        .arg(out.path())
        .args(["--entry", "app.Main", "--name", "demo"])
        .assert()
        .success()
        .stdout(predicate::str::contains("SUCCESS:"))
        .stdout(predicate::str::contains("1 classes eliminated"));

    assert!(out.path().join("app_Main.c").is_file());
    assert!(out.path().join("app_Util.h").is_file());
    assert!(!out.path().join("app_Unused.c").exists());
    let descriptor = fs::read_to_string(out.path().join("build.json")).unwrap();
    assert!(descriptor.contains("\"display_name\": \"demo\""));
}

#[test]
fn test_translate_reads_manifest() {
    let input = input_dir(false);
    let out = tempfile::tempdir().unwrap();
    let manifest = input.path().join("manifest.json");
    fs::write(
        &manifest,
        r#"{ "entry_class": "app/Main", "keep_classes": ["app/Unused"] }"#,
    )
    .unwrap();

    classport()
        .arg("translate")
        .arg(input.path())
        .arg("--output")
        .arg(out.path())
        .arg("--manifest")
        .arg(&manifest)
        .arg("--concatenate")
        .assert()
        .success()
        .stdout(predicate::str::contains("0 classes eliminated"));

    assert!(out.path().join("classport_program.c").is_file());
    assert!(!out.path().join("app_Main.c").exists());
}

#[test]
fn test_translate_without_entry_fails() {
    let input = input_dir(false);
    let out = tempfile::tempdir().unwrap();

    classport()
        .arg("translate")
        .arg(input.path())
        .arg("-o")
        .arg(out.path().join("c"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("No entry class"));

    assert!(!out.path().join("c").exists());
}

#[test]
fn test_linkage_gap_fails_without_output() {
    let input = input_dir(true);
    let out = tempfile::tempdir().unwrap();

    classport()
        .arg("translate")
        .arg(input.path())
        .arg("-o")
        .arg(out.path().join("c"))
        .args(["--entry", "app/Main"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Linkage gap"))
        .stderr(predicate::str::contains("app_Main_tick"));

    assert!(!out.path().join("c").exists());
}

#[test]
fn test_inspect_prints_cull_summary() {
    let input = input_dir(false);

    classport()
        .arg("inspect")
        .arg(input.path())
        .args(["--entry", "app/Main", "--explain", "app/Util"])
        .assert()
        .success()
        .stdout(predicate::str::contains("3 class(es)"))
        .stdout(predicate::str::contains("Cull summary"))
        .stdout(predicate::str::contains("Classes: 2 live, 1 eliminated"))
        .stdout(predicate::str::contains("Why app/Util is live:"))
        .stdout(predicate::str::contains("entry point"));
}

#[test]
fn test_inspect_verbose_lists_eliminated_classes() {
    let input = input_dir(false);

    classport()
        .arg("inspect")
        .arg(input.path())
        .args(["--entry", "app/Main"])
        .assert()
        .success()
        .stdout(predicate::str::contains("app/Unused").not());

    classport()
        .arg("inspect")
        .arg(input.path())
        .args(["--entry", "app/Main", "-v"])
        .assert()
        .success()
        .stdout(predicate::str::contains("app/Unused"));
}

#[test]
fn test_inspect_json() {
    let input = input_dir(false);

    let output = classport()
        .arg("inspect")
        .arg(input.path())
        .args(["--entry", "app/Main", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["entry_class"], "app/Main");
    assert_eq!(value["classes"].as_array().map(Vec::len), Some(3));
    assert_eq!(
        value["report"]["eliminated_classes"],
        serde_json::json!(["app/Unused"])
    );
}

#[test]
fn test_missing_input_directory() {
    let dir = tempfile::tempdir().unwrap();

    classport()
        .arg("inspect")
        .arg(dir.path().join("absent"))
        .args(["--entry", "app/Main"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("is not a directory"));
}
