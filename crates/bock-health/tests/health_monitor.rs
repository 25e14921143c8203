//! Integration tests running real probes through the host backend.
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use bock_common::ContainerId;
use bock_health::{
    EventBus, ExecRequest, HealthConfig, HealthInspection, HealthState, HealthStatus, HostExec,
    Monitor, MonitorRegistry, MonitorTarget, ProbeExecutor, ProbeOutcome, RegistryConfig,
    RuntimeEvent,
};
use tempfile::TempDir;

fn registry() -> Arc<MonitorRegistry> {
    Arc::new(MonitorRegistry::new(
        Arc::new(HostExec::new()),
        RegistryConfig::default(),
    ))
}

async fn wait_for(
    monitor: &Monitor,
    limit: Duration,
    mut done: impl FnMut(&HealthState) -> bool,
) -> Result<HealthState, Box<dyn Error>> {
    let mut rx = monitor.subscribe();
    let state = tokio::time::timeout(limit, rx.wait_for(|s| done(s))).await??;
    Ok(state.clone())
}

#[test_log::test(tokio::test)]
async fn test_probe_runs_in_working_directory() -> Result<(), Box<dyn Error>> {
    let temp_dir = TempDir::new()?;
    let workdir = temp_dir.path().canonicalize()?;
    let script = format!(
        r#"if [ "$PWD" = "{}" ]; then exit 0; else exit 1; fi"#,
        workdir.display()
    );

    let registry = registry();
    let target =
        MonitorTarget::new(ContainerId::new("workdir")?).with_working_dir(workdir.clone());
    let config = HealthConfig::shell(script)
        .with_interval(Duration::from_millis(50))
        .with_retries(3);
    let monitor = registry.start(target, config)?;

    let state = wait_for(&monitor, Duration::from_secs(5), |s| {
        s.status != HealthStatus::Starting
    })
    .await?;
    assert_eq!(state.status, HealthStatus::Healthy);
    assert_eq!(state.failing_streak, 0);

    registry.shutdown().await;
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_probe_inherits_environment() -> Result<(), Box<dyn Error>> {
    let registry = registry();
    let target = MonitorTarget::new(ContainerId::new("env")?)
        .with_env(vec![("PROBE_TOKEN".into(), "ready".into())]);
    let config = HealthConfig::shell(r#"test "$PROBE_TOKEN" = ready"#)
        .with_interval(Duration::from_millis(50));
    let monitor = registry.start(target, config)?;

    let state = wait_for(&monitor, Duration::from_secs(5), |s| {
        s.status != HealthStatus::Starting
    })
    .await?;
    assert_eq!(state.status, HealthStatus::Healthy);

    registry.shutdown().await;
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_signal_does_not_disturb_monitor() -> Result<(), Box<dyn Error>> {
    let registry = registry();
    let lifecycle: EventBus<RuntimeEvent> = EventBus::new();
    let watcher = registry.watch_lifecycle(lifecycle.subscribe());
    let id = ContainerId::new("signals")?;

    lifecycle.publish(RuntimeEvent::ContainerStarted {
        target: MonitorTarget::new(id.clone()),
        healthcheck: Some(
            HealthConfig::cmd(["true"])
                .with_interval(Duration::from_secs(1))
                .with_retries(5),
        ),
    });

    let monitor = tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            if let Some(monitor) = registry.monitor(&id) {
                return monitor;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await?;

    let healthy = wait_for(&monitor, Duration::from_secs(5), |s| {
        s.status == HealthStatus::Healthy
    })
    .await?;
    let probes_before = healthy.log.len();

    // SIGUSR1
    lifecycle.publish(RuntimeEvent::ContainerSignaled {
        id: id.clone(),
        signal: 10,
    });

    let later = wait_for(&monitor, Duration::from_secs(5), |s| {
        s.log.len() >= probes_before + 2
    })
    .await?;
    assert_eq!(later.status, HealthStatus::Healthy);
    assert_eq!(later.failing_streak, 0);
    assert!(monitor.is_running());

    // Probes stay on a one second cadence.
    let entries: Vec<_> = later.log.iter().collect();
    for pair in entries.windows(2) {
        let gap = (pair[1].start - pair[0].end).to_std()?;
        assert!(gap >= Duration::from_millis(900), "gap {gap:?}");
        assert!(gap < Duration::from_millis(1500), "gap {gap:?}");
    }

    drop(lifecycle);
    watcher.await?;
    registry.shutdown().await;
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_timeout_is_recorded_promptly() -> Result<(), Box<dyn Error>> {
    let registry = registry();
    let config = HealthConfig::cmd(["sleep", "30"])
        .with_interval(Duration::from_millis(100))
        .with_timeout(Duration::from_millis(200))
        .with_retries(1);
    let monitor = registry.start(MonitorTarget::new(ContainerId::new("slow")?), config)?;

    let state = wait_for(&monitor, Duration::from_secs(3), |s| {
        s.status == HealthStatus::Unhealthy
    })
    .await?;

    let entry = state.log.last().expect("logged timeout");
    assert_eq!(entry.outcome, ProbeOutcome::TimedOut);
    assert_eq!(entry.exit_code, -1);
    assert!(entry.output.starts_with("Health check exceeded timeout"));
    assert!(entry.duration() < Duration::from_secs(1));

    registry.shutdown().await;
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_exec_errors_count_as_failures() -> Result<(), Box<dyn Error>> {
    let registry = registry();
    let config = HealthConfig::cmd(["/nonexistent/bock-probe"])
        .with_interval(Duration::from_millis(50))
        .with_retries(2);
    let monitor = registry.start(MonitorTarget::new(ContainerId::new("broken")?), config)?;

    let state = wait_for(&monitor, Duration::from_secs(5), |s| s.log.len() >= 3).await?;
    assert_eq!(state.status, HealthStatus::Unhealthy);
    assert!(state.failing_streak >= 3);
    assert!(
        state
            .log
            .iter()
            .all(|r| r.outcome == ProbeOutcome::ExecError && r.exit_code == -1)
    );
    assert!(monitor.is_running());

    registry.shutdown().await;
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_stop_then_remove_releases_state() -> Result<(), Box<dyn Error>> {
    let registry = registry();
    let id = ContainerId::new("removed")?;
    let config = HealthConfig::cmd(["true"]).with_interval(Duration::from_millis(50));

    let first = registry.start(MonitorTarget::new(id.clone()), config.clone())?;
    let second = registry.start(MonitorTarget::new(id.clone()), config)?;
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(registry.len(), 1);

    wait_for(&first, Duration::from_secs(5), |s| {
        s.status == HealthStatus::Healthy
    })
    .await?;
    assert!(registry.snapshot(&id).is_configured());

    assert!(registry.stop(&id).await);
    assert!(!registry.stop(&id).await);
    assert_eq!(registry.snapshot(&id), HealthInspection::NotConfigured);
    assert_eq!(serde_json::to_string(&registry.snapshot(&id))?, "null");
    assert!(registry.is_empty());
    Ok(())
}

/// Whether `pid` is still a live (non-zombie) process.
fn is_alive(pid: u32) -> bool {
    std::fs::read_to_string(format!("/proc/{pid}/stat")).is_ok_and(|stat| {
        stat.rsplit_once(')')
            .is_some_and(|(_, rest)| !rest.trim_start().starts_with('Z'))
    })
}

#[test_log::test(tokio::test)]
async fn test_timed_out_shell_leaves_no_processes() -> Result<(), Box<dyn Error>> {
    let temp_dir = TempDir::new()?;
    let pid_file = temp_dir.path().join("child.pid");
    let executor = ProbeExecutor::new(Arc::new(HostExec::new()), 4096);
    let request = ExecRequest {
        container_id: ContainerId::new("orphans")?,
        args: vec![
            "/bin/sh".into(),
            "-c".into(),
            format!("sleep 30 & echo $! > {}; wait", pid_file.display()),
        ],
        working_dir: None,
        env: Vec::new(),
    };

    let result = executor.run(&request, Duration::from_millis(500)).await;
    assert_eq!(result.outcome, ProbeOutcome::TimedOut);

    let child: u32 = std::fs::read_to_string(&pid_file)?.trim().parse()?;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while is_alive(child) && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(!is_alive(child), "process {child} outlived the timed-out check");
    Ok(())
}
