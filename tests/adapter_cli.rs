//! End-to-end tests for the `meteor-adapter` binary.
//!
//! Each test runs the real binary with a bash stub standing in for METEOR
//! (passed after `--`), so no Java runtime or METEOR jar is needed.
//!
//! # Running
//!
//! ```bash
//! cargo test --test adapter_cli -- --nocapture
//! ```

use std::io::{BufRead, BufReader, Write};
use std::process::{Child, Command, Output, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use meteor_adapter::client::ExternalMeasure;
use pretty_assertions::assert_eq;

/// Timeout for any single line to appear on the adapter's stdout.
const LINE_TIMEOUT: Duration = Duration::from_secs(5);

/// Answers only the `cand ||| ref` pair and fails on anything else.
const SCENARIO_SCORER: &str = r#"
while IFS= read -r line; do
    case "$line" in
        "SCORE ||| ref ||| cand") echo "STATS:1" ;;
        "EVAL ||| STATS:1") echo "0.42" ;;
        *) echo "unexpected request: $line" >&2; exit 3 ;;
    esac
done
"#;

/// Phase 1 replies `ref=<reference>;cand=<candidate>`, phase 2 echoes the
/// statistics back as the score.
const PAIRING_SCORER: &str = r#"
while IFS= read -r line; do
    case "$line" in
        "SCORE ||| "*)
            rest="${line#SCORE ||| }"
            printf 'ref=%s;cand=%s\n' "${rest%% ||| *}" "${rest#* ||| }"
            ;;
        "EVAL ||| "*)
            printf '%s\n' "${line#EVAL ||| }"
            ;;
    esac
done
"#;

/// Answers the first phase-1 request, then dies.
const CRASHING_SCORER: &str = r#"
read -r line
echo "STATS:1"
exit 1
"#;

fn adapter() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_meteor-adapter"));
    command
        .env("RUST_LOG", "meteor_adapter=warn")
        .env_remove("METEOR_JAR")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    command
}

fn adapter_with_scorer(script: &str) -> Command {
    let mut command = adapter();
    command.args(["--", "bash", "-c", script]);
    command
}

/// Feed `input` to the adapter and collect everything it writes.
fn run_adapter(mut command: Command, input: &str) -> Output {
    let mut child = command.spawn().expect("Failed to spawn meteor-adapter");
    {
        let mut stdin = child.stdin.take().expect("stdin is piped");
        // The adapter may exit early (e.g. on malformed input) and close
        // its stdin; later writes then fail with a broken pipe.
        let _ = stdin.write_all(input.as_bytes());
    }
    child
        .wait_with_output()
        .expect("Failed to wait for meteor-adapter")
}

fn stdout_of(output: &Output) -> String {
    String::from_utf8(output.stdout.clone()).expect("stdout is UTF-8")
}

/// Read stdout on a helper thread so a withheld line fails the test instead
/// of hanging it.
fn line_receiver(child: &mut Child) -> mpsc::Receiver<String> {
    let stdout = child.stdout.take().expect("stdout is piped");
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in BufReader::new(stdout).lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });
    rx
}

#[test]
fn test_end_to_end_scenario() {
    let output = run_adapter(adapter_with_scorer(SCENARIO_SCORER), "cand ||| ref\n");

    assert!(output.status.success(), "adapter failed: {:?}", output);
    assert_eq!(stdout_of(&output), "0.42\n");
}

#[test]
fn test_pairs_reference_first_and_passes_statistics_through() {
    let output = run_adapter(
        adapter_with_scorer(PAIRING_SCORER),
        "hello world ||| hello there\n",
    );

    assert!(output.status.success(), "adapter failed: {:?}", output);
    assert_eq!(stdout_of(&output), "ref=hello there;cand=hello world\n");
}

#[test]
fn test_one_output_line_per_input_line_in_order() {
    let input: String = (0..200)
        .map(|i| format!("candidate {i} ||| reference {i}\n"))
        .collect();

    let output = run_adapter(adapter_with_scorer(PAIRING_SCORER), &input);

    assert!(output.status.success(), "adapter failed: {:?}", output);
    let expected: Vec<String> = (0..200)
        .map(|i| format!("ref=reference {i};cand=candidate {i}"))
        .collect();
    assert_eq!(stdout_of(&output).lines().collect::<Vec<_>>(), expected);
}

#[test]
fn test_each_score_is_observable_before_next_request() {
    let mut child = adapter_with_scorer(PAIRING_SCORER)
        .spawn()
        .expect("Failed to spawn meteor-adapter");
    let mut stdin = child.stdin.take().expect("stdin is piped");
    let lines = line_receiver(&mut child);

    for i in 0..5 {
        writeln!(stdin, "c{i} ||| r{i}").expect("write failed");
        stdin.flush().expect("flush failed");

        let line = lines
            .recv_timeout(LINE_TIMEOUT)
            .unwrap_or_else(|_| panic!("score for request {} was withheld", i));
        assert_eq!(line, format!("ref=r{i};cand=c{i}"));
    }

    drop(stdin);
    let status = child.wait().expect("Failed to wait for meteor-adapter");
    assert!(status.success());
    assert!(lines.recv_timeout(Duration::from_millis(200)).is_err());
}

#[test]
fn test_clean_shutdown_waits_for_scorer() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let marker = dir.path().join("scorer-saw-eof");
    let script = format!(
        r#"
while IFS= read -r line; do
    case "$line" in
        "SCORE ||| "*) echo "STATS:1" ;;
        *) echo "0.5" ;;
    esac
done
sleep 0.2
touch '{}'
"#,
        marker.display()
    );

    let output = run_adapter(adapter_with_scorer(&script), "a ||| b\nc ||| d\n");

    assert!(output.status.success(), "adapter failed: {:?}", output);
    assert_eq!(stdout_of(&output), "0.5\n0.5\n");
    assert!(
        marker.exists(),
        "adapter exited before the scorer finished"
    );
}

#[test]
fn test_empty_input_exits_cleanly() {
    let output = run_adapter(adapter_with_scorer(SCENARIO_SCORER), "");

    assert!(output.status.success(), "adapter failed: {:?}", output);
    assert!(output.stdout.is_empty());
}

#[test]
fn test_malformed_line_aborts_without_score() {
    let output = run_adapter(
        adapter_with_scorer(SCENARIO_SCORER),
        "no delimiter here\ncand ||| ref\n",
    );

    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty(), "no score may be emitted");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Malformed request on line 1"),
        "unexpected stderr: {}",
        stderr
    );
}

#[test]
fn test_malformed_line_skip_keeps_correspondence() {
    let mut command = adapter();
    command.args(["--on-malformed", "skip", "--", "bash", "-c", SCENARIO_SCORER]);

    let output = run_adapter(command, "cand ||| ref\nno delimiter here\ncand ||| ref\n");

    assert!(output.status.success(), "adapter failed: {:?}", output);
    assert_eq!(stdout_of(&output), "0.42\n\n0.42\n");
}

#[test]
fn test_scorer_crash_is_runtime_failure() {
    let output = run_adapter(
        adapter_with_scorer(CRASHING_SCORER),
        "cand ||| ref\ncand ||| ref\n",
    );

    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
}

#[test]
fn test_error_causes_are_reported_once() {
    let output = run_adapter(adapter_with_scorer("read -r line; exit 1"), "a ||| b\n");

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(
        stderr.matches("Scorer closed its output").count(),
        1,
        "unexpected stderr: {}",
        stderr
    );
    assert_eq!(stderr.matches("statistics phase failed").count(), 1);

    let output = run_adapter(adapter_with_scorer(SCENARIO_SCORER), " ||| ref\n");

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(
        stderr.matches("candidate text is empty").count(),
        1,
        "unexpected stderr: {}",
        stderr
    );
}

#[test]
fn test_missing_scorer_binary_is_setup_failure() {
    let mut command = adapter();
    command.args(["--", "/nonexistent/scorer/binary"]);

    let output = run_adapter(command, "cand ||| ref\n");

    assert_eq!(output.status.code(), Some(2));
    assert!(output.stdout.is_empty());
}

#[test]
fn test_missing_meteor_jar_is_setup_failure() {
    let mut command = adapter();
    command.args(["--jar", "/nonexistent/meteor-1.5.jar"]);

    let output = run_adapter(command, "cand ||| ref\n");

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("METEOR jar not found"),
        "unexpected stderr: {}",
        stderr
    );
}

#[test]
fn test_logs_never_reach_stdout() {
    let mut command = adapter_with_scorer(SCENARIO_SCORER);
    command.env("RUST_LOG", "meteor_adapter=trace");

    let output = run_adapter(command, "cand ||| ref\n");

    assert!(output.status.success(), "adapter failed: {:?}", output);
    assert_eq!(stdout_of(&output), "0.42\n");
    assert!(!output.stderr.is_empty());
}

#[test]
fn test_external_measure_drives_adapter() {
    let mut measure = ExternalMeasure::start(
        env!("CARGO_BIN_EXE_meteor-adapter"),
        ["--", "bash", "-c", SCENARIO_SCORER],
    )
    .expect("Failed to start adapter as external measure");

    for _ in 0..3 {
        let score = measure.score("cand", "ref").expect("score failed");
        assert_eq!(score, 0.42);
    }

    let status = measure.finish().expect("finish failed");
    assert!(status.map(|s| s.success()).unwrap_or(false));
}
