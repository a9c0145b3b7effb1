//! End-to-end spawning of the `testexe` helper on every platform.

use spawnkit::{ChildProcess, CommandLine, Environment, ErrorKind, ProcessBuilder};
use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use tempfile::tempdir;

fn testexe() -> CommandLine {
    CommandLine::new(env!("CARGO_BIN_EXE_testexe"))
}

fn run_captured(mut builder: ProcessBuilder, out: &PathBuf) -> (i32, String) {
    builder.redirect_standard_output_to_file(out);
    let mut child = builder.start().expect("failed to spawn testexe");
    let code = child.wait_for_exit().expect("failed to wait for testexe");
    (code, fs::read_to_string(out).expect("missing output file"))
}

#[test]
fn test_spawn_exits_with_zero() {
    let mut child = ProcessBuilder::new(testexe()).start().unwrap();
    child.wait_for_exit().unwrap();
    assert_eq!(child.exit_code().unwrap(), 0);
}

#[test]
fn test_spawn_exits_with_seven() {
    let mut child = ProcessBuilder::new(testexe().args(["--exit-code", "7"]))
        .start()
        .unwrap();
    child.wait_for_exit().unwrap();
    assert_eq!(child.exit_code().unwrap(), 7);
}

#[test]
fn test_spawn_from_quoted_text() {
    let text = testexe().args(["--exit-code", "12"]).to_quoted_string();
    let mut child = ChildProcess::spawn(&text).unwrap();
    assert_eq!(child.wait_for_exit().unwrap(), 12);
}

#[test]
fn test_redirect_hello() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("hello.txt");
    let (code, contents) = run_captured(
        ProcessBuilder::new(testexe().args(["--stdout-text", "hello"])),
        &out,
    );
    assert_eq!(code, 0);
    assert_eq!(contents, "hello");
}

#[test]
fn test_redirect_over_existing_file() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("hello.txt");
    fs::write(&out, "stale output that is longer than the new one").unwrap();

    let (_, contents) = run_captured(
        ProcessBuilder::new(testexe().args(["--stdout-text", "fresh"])),
        &out,
    );
    assert_eq!(contents, "fresh");
}

#[test]
fn test_arguments_with_spaces_and_quotes() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("args.txt");
    let (_, contents) = run_captured(
        ProcessBuilder::new(testexe().args(["--print-args", "two words", "say \"hi\"", "end"])),
        &out,
    );
    assert_eq!(contents, "[two words][say \"hi\"][end]");
}

#[test]
fn test_working_directory() {
    let dir = tempdir().unwrap();
    let work = dir.path().join("work");
    fs::create_dir(&work).unwrap();
    let out = dir.path().join("cwd.txt");

    let mut builder = ProcessBuilder::new(testexe().arg("--print-cwd"));
    builder.set_working_directory(&work);
    let (_, contents) = run_captured(builder, &out);

    assert_eq!(
        fs::canonicalize(contents.trim_end()).unwrap(),
        fs::canonicalize(&work).unwrap()
    );
}

#[test]
fn test_missing_working_directory() {
    let dir = tempdir().unwrap();
    let mut builder = ProcessBuilder::new(testexe());
    builder.set_working_directory(dir.path().join("nope"));
    assert_eq!(builder.start().unwrap_err().kind(), ErrorKind::WorkingDirectory);
}

#[test]
fn test_explicit_environment() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("env.txt");

    let mut env = Environment::new();
    env.set("SPAWNKIT_E2E", "from-builder");
    // Windows processes need SystemRoot to start reliably.
    if let Ok(root) = std::env::var("SystemRoot") {
        env.set("SystemRoot", root);
    }
    let builder =
        ProcessBuilder::with_environment(testexe().args(["--print-env", "SPAWNKIT_E2E"]), env);
    let (_, contents) = run_captured(builder, &out);
    assert_eq!(contents, "from-builder");
}

#[test]
fn test_explicit_environment_hides_parent_variables() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("env.txt");

    let mut env = Environment::new();
    if let Ok(root) = std::env::var("SystemRoot") {
        env.set("SystemRoot", root);
    }
    let builder =
        ProcessBuilder::with_environment(testexe().args(["--print-env", "CARGO_MANIFEST_DIR"]), env);
    let (_, contents) = run_captured(builder, &out);
    assert_eq!(contents, "<unset>");
}

#[test]
fn test_nonexistent_executable() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("no-such-helper");
    let result = ProcessBuilder::new(CommandLine::new(missing.to_str().unwrap())).start();
    assert_eq!(result.unwrap_err().kind(), ErrorKind::ExecutableNotFound);
}

#[test]
fn test_timeout_then_exit() {
    let mut child = ProcessBuilder::new(testexe().args(["--sleep-ms", "500", "--exit-code", "3"]))
        .start()
        .unwrap();
    assert_eq!(child.wait_for_exit_timeout(Duration::from_millis(10)).unwrap(), None);
    assert_eq!(child.exit_code().unwrap_err().kind(), ErrorKind::NotExited);
    assert_eq!(child.wait_for_exit().unwrap(), 3);
}

#[test]
fn test_parallel_children_from_threads() {
    let workers: Vec<_> = (0..4)
        .map(|i| {
            thread::spawn(move || {
                let code = 20 + i;
                let command = testexe()
                    .args(["--sleep-ms", "50", "--exit-code"])
                    .arg(code.to_string());
                let mut child = ProcessBuilder::new(command).start().unwrap();
                (code, child.wait_for_exit().unwrap())
            })
        })
        .collect();

    for worker in workers {
        let (expected, actual) = worker.join().unwrap();
        assert_eq!(expected, actual);
    }
}

#[test]
fn test_unbounded_timeout_waits_for_exit() {
    let mut child = ProcessBuilder::new(testexe().args(["--sleep-ms", "200", "--exit-code", "4"]))
        .start()
        .unwrap();
    assert_eq!(child.wait_for_exit_timeout(Duration::MAX).unwrap(), Some(4));
}

#[test]
fn test_redirect_file_released_despite_concurrent_spawns() {
    let dir = tempdir().unwrap();
    let long_dir = dir.path().to_path_buf();
    let sleepers = thread::spawn(move || {
        (0..8)
            .map(|i| {
                let mut builder = ProcessBuilder::new(testexe().args(["--sleep-ms", "3000"]));
                builder.redirect_standard_output_to_file(long_dir.join(format!("long-{}.txt", i)));
                builder.start().unwrap()
            })
            .collect::<Vec<_>>()
    });

    for i in 0..16 {
        let out = dir.path().join(format!("short-{}.txt", i));
        let (code, contents) = run_captured(
            ProcessBuilder::new(testexe().args(["--stdout-text", "short"])),
            &out,
        );
        assert_eq!((code, contents.as_str()), (0, "short"));
        // Only the exited child ever held the file, so it can go right away.
        fs::remove_file(&out).unwrap();
    }

    for mut sleeper in sleepers.join().unwrap() {
        assert_eq!(sleeper.wait_for_exit().unwrap(), 0);
    }
}
