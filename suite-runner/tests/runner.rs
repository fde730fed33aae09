use grader_apis::{Implementation, SuiteConfig};
use nix::sys::resource::{getrlimit, Resource, RLIM_INFINITY};
use std::{
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};
use suite_runner::{HostCommand, RunOutcome, SuiteRunner};

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn config(name: &str, max_score: f64) -> SuiteConfig {
    let mut config = SuiteConfig::new(name, "unused", "Plugin");
    config.max_score = max_score;
    config.timeout_sec = 10.0;
    config.num_proc_limit = 4096;
    config
}

fn runner() -> SuiteRunner {
    SuiteRunner::new(HostCommand {
        exe: "/bin/false".into(),
        args: Vec::new(),
    })
}

async fn run_script(body: &str, config: &SuiteConfig) -> RunOutcome {
    let scripts = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let program = write_script(scripts.path(), "suite.sh", body);
    let implementation = Implementation::Executable {
        program,
        class: "Plugin".to_string(),
    };
    runner()
        .run(&implementation, work.path(), "42", config)
        .await
        .unwrap()
}

#[tokio::test]
async fn reported_result_is_used() {
    let outcome = run_script(
        r#"read request
echo 'building...'
echo '{"success": true, "score": 20, "feedback_messages": ["all good"]}'"#,
        &config("full", 20.0),
    )
    .await;
    let res = outcome.into_result();
    assert!(res.success);
    assert_eq!(res.score, 20.0);
    assert_eq!(res.max_score, 20.0);
    assert_eq!(res.feedback_messages, vec!["all good".to_string()]);
}

#[tokio::test]
async fn environment_is_provided() {
    let outcome = run_script(
        r#"echo "{\"success\": true, \"feedback_messages\": [\"$GRADER_SUBMISSION_ID\", \"$GRADER_SUITE\", \"$(pwd)\"]}""#,
        &config("env", 1.0),
    )
    .await;
    let res = outcome.into_result();
    assert!(res.success);
    assert_eq!(res.feedback_messages[0], "42");
    assert_eq!(res.feedback_messages[1], "env");
    assert!(!res.feedback_messages[2].is_empty());
}

#[tokio::test]
async fn missing_fields_default_to_zero() {
    let res = run_script(r#"echo '{"success": true}'"#, &config("sparse", 7.0))
        .await
        .into_result();
    assert!(res.success);
    assert_eq!(res.score, 0.0);
    assert_eq!(res.max_score, 7.0);
    assert!(res.feedback_messages.is_empty());
}

#[tokio::test]
async fn silent_exit_is_a_failure() {
    let res = run_script("echo not json", &config("silent", 5.0))
        .await
        .into_result();
    assert!(!res.success);
    assert_eq!(res.score, 0.0);
    assert!(res.error.unwrap().contains("without reporting a result"));
}

#[tokio::test]
async fn non_zero_exit_is_a_crash() {
    let outcome = run_script(
        r#"echo '{"success": true, "score": 5}'
exit 3"#,
        &config("crash", 5.0),
    )
    .await;
    match outcome {
        RunOutcome::Crashed {
            exit_code,
            max_score,
            ..
        } => {
            assert_eq!(exit_code, Some(3));
            assert_eq!(max_score, 5.0);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[tokio::test]
async fn killed_by_signal() {
    let outcome = run_script("kill -9 $$", &config("signal", 5.0)).await;
    match outcome {
        RunOutcome::Crashed {
            exit_code, signal, ..
        } => {
            assert_eq!(exit_code, None);
            assert_eq!(signal, Some(9));
        }
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[tokio::test]
async fn deadline_is_enforced() {
    let mut config = config("slow", 5.0);
    config.timeout_sec = 1.0;
    let started = Instant::now();
    let outcome = run_script("exec sleep 30", &config).await;
    assert!(started.elapsed() < Duration::from_secs(10));
    match outcome {
        RunOutcome::TimedOut { max_score, error } => {
            assert_eq!(max_score, 5.0);
            assert!(error.contains("timed out"), "{}", error);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[tokio::test]
async fn file_size_limit_is_enforced() {
    let mut config = config("writer", 5.0);
    config.file_size_limit_mb = 1;
    let outcome = run_script("exec head -c 4194304 /dev/zero > big.bin", &config).await;
    match outcome {
        RunOutcome::Crashed { signal, error, .. } => {
            assert_eq!(signal, Some(nix::sys::signal::Signal::SIGXFSZ as i32));
            assert!(error.contains("file size limit"), "{}", error);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[tokio::test]
async fn builtin_runs_through_host() {
    let scripts = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let host = write_script(
        scripts.path(),
        "host.sh",
        r#"read request
case "$request" in
  *'"class":"EchoSuite"'*) echo '{"success": true, "score": 2}' ;;
  *) exit 1 ;;
esac"#,
    );
    let runner = SuiteRunner::new(HostCommand {
        exe: "/bin/sh".into(),
        args: vec![host.display().to_string()],
    });
    let implementation = Implementation::Builtin {
        class: "EchoSuite".to_string(),
        resource: "/bin/true".into(),
    };
    let res = runner
        .run(&implementation, work.path(), "7", &config("echo", 2.0))
        .await
        .unwrap()
        .into_result();
    assert!(res.success);
    assert_eq!(res.score, 2.0);
}

#[tokio::test]
async fn missing_program_is_an_error() {
    let work = tempfile::tempdir().unwrap();
    let implementation = Implementation::Executable {
        program: "/nonexistent/suite".into(),
        class: "Plugin".to_string(),
    };
    let err = runner()
        .run(&implementation, work.path(), "1", &config("gone", 1.0))
        .await
        .unwrap_err();
    assert!(format!("{:#}", err).contains("failed to spawn"));
}

#[tokio::test]
async fn background_process_does_not_hold_result() {
    let mut config = config("bg", 4.0);
    config.timeout_sec = 5.0;
    let started = Instant::now();
    let outcome = run_script(
        r#"sleep 30 &
echo '{"success": true, "score": 4}'
exit 0"#,
        &config,
    )
    .await;
    assert!(started.elapsed() < Duration::from_secs(4));
    match outcome {
        RunOutcome::Completed(res) => {
            assert!(res.success);
            assert_eq!(res.score, 4.0);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[tokio::test]
async fn stray_json_after_result_is_ignored() {
    let res = run_script(
        r#"echo '{"success": true, "score": 3}'
echo '{"foo": 1}'"#,
        &config("stray", 5.0),
    )
    .await
    .into_result();
    assert!(res.success);
    assert_eq!(res.score, 3.0);
}

/// Soft and hard value of a `/proc/<pid>/limits` row.
fn limit_row(limits: &str, name: &str) -> (String, String) {
    let row = limits
        .lines()
        .find_map(|line| line.strip_prefix(name))
        .unwrap_or_else(|| panic!("no {:?} in {}", name, limits));
    let mut values = row.split_whitespace();
    (
        values.next().unwrap().to_string(),
        values.next().unwrap().to_string(),
    )
}

/// Soft and hard value a suite should see, given the hard limit we run under.
fn expected(resource: Resource, soft: u64, hard: u64) -> (String, String) {
    let (_, current) = getrlimit(resource).unwrap();
    let hard = hard.min(current);
    let soft = soft.min(hard);
    let render = |value: u64| {
        if value == RLIM_INFINITY {
            "unlimited".to_string()
        } else {
            value.to_string()
        }
    };
    (render(soft), render(hard))
}

#[tokio::test]
async fn limits_are_applied_to_suite() {
    let scripts = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let program = write_script(
        scripts.path(),
        "suite.sh",
        r#"cat /proc/$$/limits > limits.txt
echo '{"success": true}'"#,
    );
    let implementation = Implementation::Executable {
        program,
        class: "Plugin".to_string(),
    };
    let mut config = config("limits", 1.0);
    config.timeout_sec = 2.5;
    config.ram_limit_mb = 256;
    config.file_size_limit_mb = 2;
    config.num_proc_limit = 2048;
    config.num_open_files_limit = 48;
    let res = runner()
        .run(&implementation, work.path(), "1", &config)
        .await
        .unwrap()
        .into_result();
    assert!(res.success, "{:?}", res.error);

    let limits = std::fs::read_to_string(work.path().join("limits.txt")).unwrap();
    let mib = 1024 * 1024;
    let cases = [
        ("Max cpu time", Resource::RLIMIT_CPU, 3, 4),
        ("Max address space", Resource::RLIMIT_AS, 256 * mib, 256 * mib),
        ("Max file size", Resource::RLIMIT_FSIZE, 2 * mib, 2 * mib),
        ("Max processes", Resource::RLIMIT_NPROC, 2048, 2048),
        ("Max open files", Resource::RLIMIT_NOFILE, 48, 48),
        ("Max core file size", Resource::RLIMIT_CORE, 0, 0),
    ];
    for (name, resource, soft, hard) in cases {
        assert_eq!(
            limit_row(&limits, name),
            expected(resource, soft, hard),
            "{}",
            name
        );
    }
}
