// watch.rs - Long-running mode: poll the feed, print events, optionally dispatch.
//
// Case events come from following the shared event log, so changes made by
// other `notaria` commands show up here too. Runs until Ctrl+C, then shuts the
// follower and the engine down so their tasks have exited before the process
// does.

use nt_events::{BroadcastHub, LogFollower, Observed, Subscription, DEFAULT_FOLLOW_INTERVAL};
use nt_feed::ReadinessSet;
use nt_lifecycle::{Engine, EngineOptions, NotariaConfig};

use crate::context::Context;

pub fn execute(config: &NotariaConfig, auto_dispatch: bool) -> anyhow::Result<()> {
    let ctx = Context::open(config)?;
    let notifier = config.build_notifier()?;
    let feed = config.build_feed()?;
    let options = EngineOptions {
        poll_interval: config.settings.feed.poll_interval(),
        dispatch_timeout: config.settings.dispatch.timeout(),
        sent_by: config.settings.dispatch.sent_by.clone(),
    };

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let hub = BroadcastHub::new();
        let mut events = hub.subscribe();
        let follower = LogFollower::spawn(&config.events_log, hub, DEFAULT_FOLLOW_INTERVAL);
        let engine = Engine::start(ctx.manager.clone(), notifier, feed.clone(), options);
        tracing::info!(
            "watching {} every {:?} (auto-dispatch: {})",
            feed.describe(),
            config.settings.feed.poll_interval(),
            auto_dispatch
        );
        println!("Watching. Press Ctrl+C to stop.");

        let result = run(&engine, &mut events, auto_dispatch).await;
        follower.shutdown().await;
        engine.shutdown().await;
        result
    })
}

async fn run(engine: &Engine, events: &mut Subscription, auto_dispatch: bool) -> anyhow::Result<()> {
    let mut feed_updates = engine.feed_updates();
    let mut ready = ReadinessSet::default();

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                println!("Stopping.");
                return Ok(());
            }
            changed = feed_updates.changed() => {
                if changed.is_err() {
                    anyhow::bail!("feed poller stopped unexpectedly");
                }
                let snapshot = engine.feed_snapshot();
                tracing::debug!(
                    "feed generation {}: {} entr(ies)",
                    snapshot.generation,
                    snapshot.entries.len()
                );
                let current = engine.readiness();
                for case_id in current.newly_ready(&ready) {
                    println!(
                        "ready   {}  radicado {}",
                        case_id,
                        current.radicado(case_id).unwrap_or("-")
                    );
                }
                ready = current;

                if auto_dispatch && !ready.is_empty() {
                    let report = engine.dispatch_ready(None).await;
                    for failure in &report.failed {
                        println!(
                            "FAILED  {}  radicado {}: {}",
                            failure.case_id, failure.radicado, failure.error
                        );
                    }
                    // Failed cases stay ready and are retried on the next refresh.
                    ready = engine.readiness();
                }
            }
            observed = events.recv() => match observed {
                Some(Observed::Event(event)) => {
                    println!("{:<14}  {}  radicado {}", event.event_type(), event.case_id(), event.radicado());
                }
                Some(Observed::Resync { missed }) => {
                    println!("(missed {} event(s); run `notaria case list` for current state)", missed);
                }
                None => anyhow::bail!("event hub closed"),
            },
        }
    }
}
