//! `beadctl run` — starts the dispatcher's tick loop in-process for one
//! project, until Ctrl-C. No socket is opened: this is a long-lived local
//! loop over the same sqlite-backed stores the other subcommands use, not a
//! network daemon.

use std::sync::Arc;

use bf_agents::persona::PersonaRegistry;
use bf_agents::pool::WorkerPool;
use bf_core::project::Project;
use bf_dispatch::Dispatcher;
use bf_eventbus::EventBus;
use bf_harness::shutdown::ShutdownSignal;
use bf_telemetry::metrics::MetricsRegistry;

use crate::context::AppContext;
use crate::personas::default_personas;

pub struct RunOptions {
    pub project_id: String,
    pub project_name: String,
    pub prefix: String,
    pub repo_root: String,
    pub concurrency_cap: u32,
    pub worker_count: u32,
}

pub async fn run(ctx: &AppContext, opts: RunOptions) -> anyhow::Result<()> {
    let pool = Arc::new(WorkerPool::new());
    let personas = Arc::new(PersonaRegistry::new());
    for persona in default_personas() {
        personas.register(persona);
    }

    for i in 0..opts.worker_count {
        let persona_name = personas.names().get((i as usize) % personas.names().len().max(1)).cloned().unwrap_or_else(|| "generalist".to_string());
        pool.spawn(persona_name, "manual-provider", &opts.project_id);
    }

    let bus = EventBus::new();
    let metrics = Arc::new(MetricsRegistry::new());

    let mut project = Project::new(opts.project_id.as_str(), opts.project_name.as_str(), opts.prefix.as_str(), opts.repo_root.as_str());
    project.concurrency_cap = opts.concurrency_cap;

    let dispatcher = Arc::new(Dispatcher::new(
        ctx.store.clone(),
        pool.clone(),
        personas,
        ctx.locks.clone(),
        bus,
        metrics,
        ctx.config.dispatcher.clone(),
    ));
    dispatcher.register_project(project);

    let shutdown = ShutdownSignal::new();
    let shutdown_for_signal = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("ctrl-c received, shutting down dispatcher");
        shutdown_for_signal.trigger();
    });

    println!("dispatcher running for project {} (ctrl-c to stop)", opts.project_id);
    dispatcher.run(shutdown).await;
    Ok(())
}
