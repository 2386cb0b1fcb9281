// tests/engine_scenarios.rs
//
// End-to-end executions through `sh`, covering normal exit, failing exit,
// startup failures and the stream relays.
#![cfg(unix)]

use std::error::Error;

use scriptexec::errors::ScriptError;
use scriptexec::exec::{CaptureBuffer, ScriptEngine, ScriptIo};
use scriptexec::types::{BindingValue, Bindings, ExecutionOutcome, VARIABLES_BINDING_NAME};
use scriptexec_test_utils::builders::{BindingsBuilder, ConfigFileBuilder};
use scriptexec_test_utils::{init_tracing, leftover_files, with_timeout};
use tempfile::TempDir;

type TestResult = Result<(), Box<dyn Error>>;

fn shell_engine(dir: &TempDir) -> ScriptEngine {
    ScriptEngine::from_config(ConfigFileBuilder::shell().script_dir(dir.path()).build())
}

fn captured() -> (ScriptIo, CaptureBuffer, CaptureBuffer) {
    let out = CaptureBuffer::new();
    let err = CaptureBuffer::new();
    let io = ScriptIo::null()
        .with_stdout(out.clone())
        .with_stderr(err.clone());
    (io, out, err)
}

#[tokio::test]
async fn hello_exits_zero_and_records_exit_value() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let engine = shell_engine(&dir);
    let (io, out, _) = captured();
    let mut bindings = Bindings::new();

    let outcome = with_timeout(engine.eval("echo hello\nexit 0\n", &mut bindings, io, None)).await?;

    assert_eq!(outcome, ExecutionOutcome::Completed { exit_code: 0 });
    assert_eq!(out.to_string_lossy(), "hello\n");
    assert_eq!(bindings.exit_value(), Some(0));
    assert_eq!(leftover_files(dir.path()), 0);
    Ok(())
}

#[tokio::test]
async fn non_zero_exit_fails_but_still_records_exit_value() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let engine = shell_engine(&dir);
    let mut bindings = BindingsBuilder::new().context("PA_JOB_ID", "1").build();

    let result = with_timeout(engine.eval("exit 7", &mut bindings, ScriptIo::null(), None)).await;

    match result {
        Err(ScriptError::NonZeroExit(code)) => assert_eq!(code, 7),
        other => panic!("expected NonZeroExit(7), got {other:?}"),
    }
    assert_eq!(bindings.exit_value(), Some(7));
    let vars = bindings
        .get(VARIABLES_BINDING_NAME)
        .and_then(BindingValue::as_map)
        .expect("variables map");
    assert_eq!(vars.get("EXIT_VALUE"), Some(&BindingValue::from("7")));
    assert_eq!(leftover_files(dir.path()), 0);
    Ok(())
}

#[tokio::test]
async fn missing_interpreter_is_a_spawn_error_and_cleans_up() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let cfg = ConfigFileBuilder::new()
        .interpreter("/nonexistent/bin/perl")
        .script_dir(dir.path())
        .build();
    let engine = ScriptEngine::from_config(cfg);
    let mut bindings = Bindings::new();

    let result = engine.eval("print 1;", &mut bindings, ScriptIo::null(), None).await;

    assert!(matches!(result, Err(ScriptError::Spawn { .. })), "got {result:?}");
    assert_eq!(bindings.exit_value(), None);
    assert_eq!(leftover_files(dir.path()), 0);
    assert!(engine.hooks().is_empty());
    Ok(())
}

#[tokio::test]
async fn unusable_script_directory_is_a_materialization_error() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let missing = dir.path().join("does-not-exist");
    let engine = ScriptEngine::from_config(ConfigFileBuilder::shell().script_dir(&missing).build());
    let mut bindings = Bindings::new();

    let result = engine.eval("exit 0", &mut bindings, ScriptIo::null(), None).await;

    assert!(matches!(result, Err(ScriptError::Materialization { .. })), "got {result:?}");
    assert!(engine.hooks().is_empty());
    Ok(())
}

#[tokio::test]
async fn bindings_reach_the_script_environment() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let engine = shell_engine(&dir);
    let (io, out, _) = captured();
    let mut bindings = BindingsBuilder::new()
        .scalar("name", "EchoUbuntu")
        .null("empty")
        .list("arr", &["first", "second"])
        .map("m", &[("a", "alpha")])
        .build();

    let script = r#"printf '%s|%s|%s|%s|%s' "$name" "${empty-unset}" "$arr_0" "$arr_1" "$m_a""#;
    with_timeout(engine.eval(script, &mut bindings, io, None)).await?;

    assert_eq!(out.to_string_lossy(), "EchoUbuntu||first|second|alpha");
    Ok(())
}

#[tokio::test]
async fn host_environment_stays_visible() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let engine = shell_engine(&dir);
    let (io, out, _) = captured();
    let mut bindings = Bindings::new();

    with_timeout(engine.eval(r#"printf '%s' "$PATH""#, &mut bindings, io, None)).await?;

    assert_eq!(out.to_string_lossy(), std::env::var("PATH").unwrap_or_default());
    Ok(())
}

#[tokio::test]
async fn stderr_and_stdin_are_relayed() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let engine = shell_engine(&dir);
    let (io, out, err) = captured();
    let io = io.with_stdin(&b"ping\n"[..]);
    let mut bindings = Bindings::new();

    let script = "read line\necho \"got $line\"\necho oops 1>&2\n";
    with_timeout(engine.eval(script, &mut bindings, io, None)).await?;

    assert_eq!(out.to_string_lossy(), "got ping\n");
    assert_eq!(err.to_string_lossy(), "oops\n");
    Ok(())
}

#[tokio::test]
async fn large_output_on_both_streams_does_not_deadlock() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let engine = shell_engine(&dir);
    let (io, out, err) = captured();
    let mut bindings = Bindings::new();

    let script = "head -c 400000 /dev/zero | tr '\\0' 'o'\nhead -c 300000 /dev/zero | tr '\\0' 'e' 1>&2\n";
    with_timeout(engine.eval(script, &mut bindings, io, None)).await?;

    assert_eq!(out.contents().len(), 400_000);
    assert_eq!(err.contents().len(), 300_000);
    Ok(())
}

#[tokio::test]
async fn script_from_reader_runs() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let engine = shell_engine(&dir);
    let (io, out, _) = captured();
    let mut bindings = Bindings::new();

    with_timeout(engine.eval_reader(&b"echo from-reader"[..], &mut bindings, io, None)).await?;

    assert_eq!(out.to_string_lossy(), "from-reader\n");
    Ok(())
}

#[tokio::test]
async fn substitution_rewrites_script_when_enabled() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let cfg = ConfigFileBuilder::shell()
        .script_dir(dir.path())
        .substitute_variables(true)
        .build();
    let engine = ScriptEngine::from_config(cfg);
    let (io, out, _) = captured();
    let mut bindings = BindingsBuilder::new().scalar("greeting", "'hi there'").build();

    with_timeout(engine.eval("echo $greeting", &mut bindings, io, None)).await?;

    assert_eq!(out.to_string_lossy(), "hi there\n");
    Ok(())
}

#[test]
fn blocking_entry_point_runs_in_calling_thread() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let engine = shell_engine(&dir);
    let out = CaptureBuffer::new();
    let mut bindings = BindingsBuilder::new().scalar("who", "sync").build();

    let outcome = engine.eval_blocking(
        "echo \"hello $who\"",
        &mut bindings,
        ScriptIo::null().with_stdout(out.clone()),
        None,
    )?;

    assert_eq!(outcome.exit_code(), Some(0));
    assert_eq!(out.to_string_lossy(), "hello sync\n");
    assert_eq!(leftover_files(dir.path()), 0);
    Ok(())
}

#[tokio::test]
async fn concurrent_executions_are_isolated() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let engine = shell_engine(&dir);

    let mut handles = Vec::new();
    for i in 0..4 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            let out = CaptureBuffer::new();
            let mut bindings = BindingsBuilder::new().scalar("N", &i.to_string()).build();
            engine
                .eval(
                    "sleep 0.1; printf '%s' \"$N\"",
                    &mut bindings,
                    ScriptIo::null().with_stdout(out.clone()),
                    None,
                )
                .await
                .map(|_| out.to_string_lossy())
        }));
    }

    for (i, handle) in handles.into_iter().enumerate() {
        let printed = with_timeout(handle).await??;
        assert_eq!(printed, i.to_string());
    }
    assert_eq!(leftover_files(dir.path()), 0);
    Ok(())
}

#[tokio::test]
async fn relative_script_directory_works_with_other_working_directory() -> TestResult {
    init_tracing();
    // Relative to the test's own working directory.
    let scripts = tempfile::Builder::new().prefix("scripts-").tempdir_in(".")?;
    let relative = std::path::PathBuf::from(scripts.path().file_name().ok_or("no file name")?);
    let elsewhere = TempDir::new()?;
    let cfg = ConfigFileBuilder::shell()
        .script_dir(&relative)
        .working_directory(elsewhere.path())
        .build();
    let engine = ScriptEngine::from_config(cfg);
    let (io, out, _) = captured();
    let mut bindings = Bindings::new();

    with_timeout(engine.eval("pwd", &mut bindings, io, None)).await?;

    let printed = std::path::PathBuf::from(out.to_string_lossy().trim());
    assert_eq!(printed.canonicalize()?, elsewhere.path().canonicalize()?);
    assert_eq!(leftover_files(scripts.path()), 0);
    Ok(())
}
