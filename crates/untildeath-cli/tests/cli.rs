//! End-to-end tests running the `untildeath` binary against the literal
//! program/output pairs a complete implementation is expected to match.

use assert_cmd::Command;
use predicates::prelude::*;
use std::sync::atomic::{AtomicU64, Ordering};

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// Writes `source` to a fresh temp `.~ATH` file and returns its path. Each
/// call gets a unique name (process id + a counter) so parallel test threads
/// never collide on the same path.
fn program_file(source: &str) -> std::path::PathBuf {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let path = std::env::temp_dir().join(format!("untildeath-cli-test-{}-{n}.~ATH", std::process::id()));
    std::fs::write(&path, source).expect("failed to write temp program");
    path
}

fn run(source: &str) -> assert_cmd::assert::Assert {
    let path = program_file(source);
    let result = Command::cargo_bin("untildeath").unwrap().arg(&path).assert();
    std::fs::remove_file(&path).ok();
    result
}

#[test]
fn hello_world() {
    run(r#"import timer T(1ms); ~ATH(T) { } EXECUTE(UTTER("Hello, world!")); THIS.DIE();"#)
        .success()
        .stdout(predicate::str::contains("Hello, world!"));
}

#[test]
fn recursive_fibonacci() {
    run(
        r#"import timer T(1ms); ~ATH(T) { } EXECUTE(RITE fib(n){SHOULD n<=1{BEQUEATH n;} BEQUEATH fib(n-1)+fib(n-2);} UTTER(fib(10));); THIS.DIE();"#,
    )
    .success()
    .stdout(predicate::str::contains("55"));
}

#[test]
fn attempt_salvage_catches_condemn() {
    run(
        r#"import timer T(1ms); ~ATH(T) { } EXECUTE(ATTEMPT { CONDEMN "oops"; } SALVAGE e { UTTER("caught: " + e); }); THIS.DIE();"#,
    )
    .success()
    .stdout(predicate::str::contains("caught: oops"));
}

#[test]
fn or_composite_resolves_on_first_death() {
    run(
        r#"import timer T1(10ms); import timer T2(1ms); ~ATH(T1 || T2) { } EXECUTE(UTTER("done")); THIS.DIE();"#,
    )
    .success()
    .stdout(predicate::str::contains("done"));
}

#[test]
fn bifurcated_branches_share_mutable_state() {
    run(
        r#"BIRTH c WITH 0; bifurcate THIS[L,R]; ~ATH(L){import timer T1(1ms); ~ATH(T1){} EXECUTE(c=c+1;);} EXECUTE(VOID); ~ATH(R){import timer T2(2ms); ~ATH(T2){} EXECUTE(c=c+10;);} EXECUTE(VOID); import timer w(10ms); ~ATH(w){} EXECUTE(UTTER(c)); [L,R].DIE();"#,
    )
    .success()
    .stdout(predicate::str::contains("11"));
}

#[test]
fn string_concatenation_stringifies_mixed_numeric_types() {
    run(r#"import timer T(1ms); ~ATH(T) { } EXECUTE(UTTER("Value: " + 42 + " and " + 3.14)); THIS.DIE();"#)
        .success()
        .stdout(predicate::str::contains("Value: 42 and 3.14"));
}

#[test]
fn repl_runs_accumulated_statements() {
    Command::cargo_bin("untildeath")
        .unwrap()
        .write_stdin("BIRTH x WITH 1 + 2;\nUTTER(x);\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("3"));
}

#[test]
fn missing_file_exits_nonzero() {
    Command::cargo_bin("untildeath")
        .unwrap()
        .arg("/nonexistent/path/to/a/program.~ATH")
        .assert()
        .failure()
        .code(1);
}
