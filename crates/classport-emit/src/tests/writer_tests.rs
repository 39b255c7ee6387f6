use super::fixtures::{shapes_program, single_class, MAIN};
use crate::config::EmitterConfig;
use crate::descriptor::{hex_digest, BuildDescriptor, FileRole};
use crate::writer::{emit_program, render_program};
use crate::EmitError;
use classport_core::{BuildManifest, NativeSource, TranslateError};
use pretty_assertions::assert_eq;
use std::fs;
use std::path::PathBuf;

#[test]
fn test_render_orders_outputs() {
    let program = shapes_program();
    let output = render_program(&program, &EmitterConfig::default()).unwrap();
    let names: Vec<&str> = output.files.keys().map(String::as_str).collect();

    assert_eq!(names.first(), Some(&"classport_runtime.h"));
    assert_eq!(names.last(), Some(&"classport_metadata.c"));
    for class in &program.classes {
        let stem = classport_core::codegen::mangle::class_name(&class.name);
        assert!(names.contains(&format!("{}.h", stem).as_str()));
        assert!(names.contains(&format!("{}.c", stem).as_str()));
    }
    assert!(output.get("app_Main.c").unwrap().contains(&program.entry_symbol));
}

#[test]
fn test_emit_writes_files_and_descriptor() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let program = shapes_program();
    let mut manifest = BuildManifest::with_entry(MAIN);
    manifest.display_name = "Shapes".to_string();
    manifest.platform = "linux-x86_64".to_string();

    let summary = emit_program(&program, &out, &EmitterConfig::default(), &manifest).unwrap();

    assert_eq!(summary.descriptor_path, out.join("build.json"));
    let descriptor =
        BuildDescriptor::from_json(&fs::read_to_string(&summary.descriptor_path).unwrap()).unwrap();
    assert_eq!(descriptor.display_name, "Shapes");
    assert_eq!(descriptor.platform, "linux-x86_64");
    assert_eq!(descriptor.entry_symbol, program.entry_symbol);
    assert_eq!(descriptor.runtime_header, "classport_runtime.h");
    for file in &descriptor.files {
        let bytes = fs::read(out.join(&file.path)).unwrap();
        assert_eq!(file.sha256, hex_digest(&bytes), "digest of {}", file.path);
        assert_eq!(file.bytes, bytes.len());
    }
    let sources: Vec<&str> = descriptor.sources().collect();
    assert!(sources.contains(&"app_Main.c"));
    assert!(sources.contains(&"classport_metadata.c"));
    assert!(!sources.contains(&"classport_runtime.h"));
    assert_eq!(summary.classes, program.classes.len());
}

#[test]
fn test_manifest_can_request_single_unit() {
    let dir = tempfile::tempdir().unwrap();
    let program = shapes_program();
    let mut manifest = BuildManifest::with_entry(MAIN);
    manifest.concatenate = true;

    let summary =
        emit_program(&program, dir.path(), &EmitterConfig::default(), &manifest).unwrap();

    let combined = fs::read_to_string(dir.path().join("classport_program.c")).unwrap();
    assert!(combined.contains("#include \"app_Main.h\""));
    assert!(combined.contains("#include \"app_Derived.h\""));
    assert!(!dir.path().join("app_Main.c").exists());
    assert!(dir.path().join("app_Main.h").exists());
    let compiled = summary
        .descriptor
        .files
        .iter()
        .filter(|f| f.role == FileRole::ClassSource)
        .count();
    assert_eq!(compiled, 1);
}

#[test]
fn test_native_sources_are_copied() {
    let dir = tempfile::tempdir().unwrap();
    let mut program = single_class(|c| {
        c.native_method("now", "()J")?;
        Ok(())
    });
    program.native_sources.push(NativeSource {
        path: PathBuf::from("natives/clock.c"),
        contents: "JAVA_LONG app_Main_now___R_long(CLASSPORT_THREAD_STATE* ts) { return 1; }\n"
            .to_string(),
    });

    let summary = emit_program(
        &program,
        dir.path(),
        &EmitterConfig::default(),
        &BuildManifest::with_entry(MAIN),
    )
    .unwrap();

    let copied = fs::read_to_string(dir.path().join("clock.c")).unwrap();
    assert!(copied.contains("return 1;"));
    let entry = summary.descriptor.file("clock.c").unwrap();
    assert_eq!(entry.role, FileRole::NativeSource);
    let header = fs::read_to_string(dir.path().join("app_Main.h")).unwrap();
    assert!(header.contains("JAVA_LONG app_Main_now___R_long(CLASSPORT_THREAD_STATE* ts);"));
}

#[test]
fn test_linkage_gap_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let mut program = shapes_program();
    program
        .classes
        .iter_mut()
        .find(|c| c.name == "app/Derived")
        .unwrap()
        .methods
        .retain(|m| m.name != "speak");

    let err = emit_program(
        &program,
        &out,
        &EmitterConfig::default(),
        &BuildManifest::with_entry(MAIN),
    )
    .unwrap_err();

    assert!(matches!(
        err,
        EmitError::Translate(TranslateError::LinkageGap { .. })
    ));
    assert!(!out.exists());
}
