use std::path::PathBuf;
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

const PIC32_MANIFEST: &str = "../../configs/pic32mx795f512l.yaml";
const STM32_MANIFEST: &str = "../../configs/stm32f103-pctest-window.yaml";

fn write_temp_file(prefix: &str, contents: &str) -> PathBuf {
    let mut dir = std::env::temp_dir();
    dir.push("classb-tests");
    let _ = std::fs::create_dir_all(&dir);

    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let path = dir.join(format!("{}-{}.yaml", prefix, nonce));
    std::fs::write(&path, contents).expect("Failed to write temp file");
    path
}

fn classb(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_classb"))
        .args(args)
        .output()
        .expect("Failed to execute classb")
}

fn stdout_json(output: &std::process::Output) -> serde_json::Value {
    let stdout = String::from_utf8(output.stdout.clone()).unwrap();
    serde_json::from_str(&stdout).expect("stdout is not JSON")
}

#[test]
fn test_cli_help() {
    let output = classb(&["--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("Class-B Program Counter Test"));
    assert!(stdout.contains("verify-elf"));
}

#[test]
fn test_cli_run_passes_natively() {
    let output = classb(&["run", "--iterations", "100", "--json"]);
    assert!(output.status.success());

    let report = stdout_json(&output);
    assert_eq!(report["verdict"], "pass");
    assert_eq!(report["raw"], 1);
    assert_eq!(report["iterations"], 100);
    assert_eq!(report["failures"], 0);
    assert_eq!(report["source"], "linked");

    let readings = report["readings"].as_array().unwrap();
    assert_eq!(readings.len(), 3);
    for reading in readings {
        assert_eq!(reading["expected"], reading["observed"]);
    }
}

#[test]
fn test_cli_run_text_output() {
    let output = classb(&["run"]);
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("PC test: PASS (1)"));
    assert!(stdout.contains("ssl_test_pc_function3"));
}

#[test]
fn test_cli_run_rejects_zero_iterations() {
    // Zero runs would report PASS without calling a single probe.
    let output = classb(&["run", "--iterations", "0", "--json"]);
    assert!(!output.status.success());
    assert_eq!(output.status.code(), Some(2));
    assert!(output.stdout.is_empty());
}

#[test]
fn test_cli_check_pic32_manifest() {
    let output = classb(&["check", "--manifest", PIC32_MANIFEST, "--json"]);
    assert!(output.status.success());

    let report = stdout_json(&output);
    assert_eq!(report["chip"], "pic32mx795f512l");
    assert_eq!(report["mask"], 0x7_FFFC);

    let addresses: Vec<u64> = report["probes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["address"].as_u64().unwrap())
        .collect();
    assert_eq!(addresses, vec![0x9D00_0000, 0x9D02_AAA8, 0x9D05_5554]);
    assert_eq!(report["probes"][1]["section"], ".ssl_test_pc_function2");
}

#[test]
fn test_cli_check_derived_window() {
    let output = classb(&["check", "-m", STM32_MANIFEST]);
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("0x0800AAA8"));
    assert!(stdout.contains("0x0800D554"));
    assert!(stdout.contains("Placement OK"));
}

#[test]
fn test_cli_linker_script_to_file() {
    let out = std::env::temp_dir().join("classb-pctest-fragment.x");
    let _ = std::fs::remove_file(&out);

    let output = classb(&[
        "linker-script",
        "--manifest",
        STM32_MANIFEST,
        "--output",
        out.to_str().unwrap(),
    ]);
    assert!(output.status.success());

    let script = std::fs::read_to_string(&out).unwrap();
    assert!(script.contains(".ssl_test_pc_function1 0x08008000"));
    assert!(script.contains("KEEP(*(.ssl_test_pc_function3))"));
    assert!(script.contains("INSERT AFTER .text;"));

    let _ = std::fs::remove_file(&out);
}

#[test]
fn test_cli_coverage_is_complete() {
    let output = classb(&["coverage", "--manifest", PIC32_MANIFEST, "--json"]);
    assert!(output.status.success());

    let report = stdout_json(&output);
    assert_eq!(report["injected"], 37);
    assert_eq!(report["detected"], 37);
    assert!(report["first_escape"].is_null());
    assert_eq!(report["ratio"], 1.0);
}

#[test]
fn test_cli_rejects_unseparated_manifest() {
    let manifest = write_temp_file(
        "weak-manifest",
        r#"
schema_version: "1.0"
chip:
  name: weak
  flash:
    base: 0x9D000000
    size: "512 KiB"
probes: [0x9D000000, 0x9D000004, 0x9D000008]
"#,
    );

    let output = classb(&["check", "--manifest", manifest.to_str().unwrap()]);
    assert!(!output.status.success());
    assert_eq!(output.status.code(), Some(2)); // EXIT_CONFIG_ERROR

    let _ = std::fs::remove_file(&manifest);
}

#[test]
fn test_cli_missing_manifest() {
    let output = classb(&["check", "--manifest", "does-not-exist.yaml"]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_cli_verify_elf_missing_firmware() {
    let output = classb(&[
        "verify-elf",
        "--manifest",
        PIC32_MANIFEST,
        "--firmware",
        "non_existent_file.elf",
    ]);
    assert_eq!(output.status.code(), Some(2));
}

#[cfg(target_os = "linux")]
#[test]
fn test_cli_verify_elf_reports_misplaced_probes() {
    // The host build of the tool itself carries the probe symbols, but not
    // at the PIC32 addresses.
    let output = classb(&[
        "verify-elf",
        "--manifest",
        PIC32_MANIFEST,
        "--firmware",
        env!("CARGO_BIN_EXE_classb"),
        "--json",
    ]);
    assert_eq!(output.status.code(), Some(1)); // EXIT_FAIL

    let report = stdout_json(&output);
    assert_eq!(report["verdict"], "fail");
    assert_eq!(report["readings"][0]["expected"], 0x9D00_0000u64);
}
