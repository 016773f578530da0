//! Simulated server: a game-tick loop that owns the world and drains the
//! mutation queue, with the dispatcher ticking on its own task.

use anyhow::Context;
use clap::Args;
use glam::DVec3;
use popguard_common::{EntityKind, Location};
use popguard_config::ConfigHandle;
use popguard_kernel::{Server, ServerEvent, SpawnOutcome, SpawnRequest};
use popguard_limiter::command::{self, COMMAND_NAME};
use popguard_limiter::{CommandSender, Dispatcher, SpawnGuard, SpawnStats, mutation_queue};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::oneshot;

const WORLD: &str = "world";
const WORLD_SPAWN: DVec3 = DVec3::new(0.0, 64.0, 0.0);
const GAME_TICK: Duration = Duration::from_millis(50);

const SPAWN_TABLE: &[EntityKind] = &[
    EntityKind::Zombie,
    EntityKind::Zombie,
    EntityKind::Skeleton,
    EntityKind::Creeper,
    EntityKind::Spider,
    EntityKind::Cow,
    EntityKind::Pig,
    EntityKind::Sheep,
    EntityKind::Villager,
    EntityKind::Item,
    EntityKind::Item,
    EntityKind::ExperienceOrb,
    EntityKind::Arrow,
];

const NAMES: &[&str] = &["Steve", "AdminBot", "héllo", "Moderator_Jim", "Rex", "Ñandú"];

#[derive(Args)]
pub struct SimArgs {
    /// Path to config.yml; written with defaults if missing
    #[arg(short, long, default_value = crate::DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    /// Number of connected observers
    #[arg(short, long, default_value = "3")]
    observers: usize,
    /// How long to run, in seconds
    #[arg(short, long, default_value = "30")]
    seconds: u64,
    /// Spawn attempts per game tick
    #[arg(long, default_value = "4")]
    spawn_rate: u32,
    /// RNG seed for the world
    #[arg(long, default_value = "42")]
    seed: u64,
}

pub fn run(args: SimArgs) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(simulate(args));
    // A pending stdin read holds a blocking thread until a line arrives.
    runtime.shutdown_timeout(Duration::from_millis(100));
    result
}

async fn simulate(args: SimArgs) -> anyhow::Result<()> {
    let (config, report) = ConfigHandle::open(&args.config)
        .with_context(|| format!("opening {}", args.config.display()))?;
    println!("{}", config.current().summary());

    let mut server = Server::with_seed(args.seed);
    server.add_world(WORLD, WORLD_SPAWN);
    let mut anchors = Vec::with_capacity(args.observers);
    for _ in 0..args.observers {
        let x = (server.next_unit() - 0.5) * 800.0;
        let z = (server.next_unit() - 0.5) * 800.0;
        let view_distance = 4 + (server.next_random() % 9) as u32;
        let location = Location::new(WORLD, x, 64.0, z);
        server.join(location.clone(), view_distance);
        anchors.push(location);
    }

    let guard = SpawnGuard::new(config.reader());
    let stats = guard.stats();
    server.register_listener(Box::new(guard));

    let (mutations, mut queue) = mutation_queue::<Server>();
    let dispatcher = Dispatcher::new(config.reader(), server.roster(), mutations);
    let (stop, stopped) = oneshot::channel::<()>();
    let dispatcher = tokio::spawn(dispatcher.run(async move {
        let _ = stopped.await;
    }));

    tracing::info!(
        observers = args.observers,
        seconds = args.seconds,
        config_warnings = report.warnings.len(),
        "simulation started; type `{COMMAND_NAME} reload` to reload the config"
    );

    let mut console = BufReader::new(tokio::io::stdin()).lines();
    let mut console_open = true;
    let mut ticker = tokio::time::interval(GAME_TICK);
    let deadline = tokio::time::sleep(Duration::from_secs(args.seconds));
    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(deadline, interrupt);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = &mut interrupt => break,
            _ = ticker.tick() => {
                for _ in 0..args.spawn_rate {
                    spawn_random(&mut server, &anchors)?;
                }
                queue.run_pending(&mut server);
                server.step();
            }
            line = console.next_line(), if console_open => match line {
                Ok(Some(line)) => console_command(&config, &line),
                Ok(None) => console_open = false,
                Err(e) => {
                    tracing::warn!(error = %e, "console closed");
                    console_open = false;
                }
            },
        }
    }

    let _ = stop.send(());
    dispatcher.await?;
    queue.run_pending(&mut server);

    print_summary(&server, &stats);
    Ok(())
}

fn spawn_random(server: &mut Server, anchors: &[Location]) -> anyhow::Result<SpawnOutcome> {
    let kind = SPAWN_TABLE[(server.next_random() % SPAWN_TABLE.len() as u64) as usize];

    // Mostly around observers, sometimes near world spawn.
    let (center, spread) = if anchors.is_empty() || server.next_unit() < 0.2 {
        (WORLD_SPAWN, 150.0)
    } else {
        let anchor = &anchors[(server.next_random() % anchors.len() as u64) as usize];
        (anchor.position, 48.0)
    };
    let x = center.x + (server.next_unit() - 0.5) * 2.0 * spread;
    let z = center.z + (server.next_unit() - 0.5) * 2.0 * spread;

    let mut request = SpawnRequest::new(kind, Location::new(WORLD, x, 64.0, z));
    if server.next_unit() < 0.1 {
        let name = NAMES[(server.next_random() % NAMES.len() as u64) as usize];
        request = request.named(name);
    }
    Ok(server.spawn(request)?)
}

/// Split a console line into command arguments if it addresses `popguard`.
fn parse_console(line: &str) -> Option<Vec<&str>> {
    let mut words = line.trim().trim_start_matches('/').split_whitespace();
    match words.next() {
        Some(name) if name.eq_ignore_ascii_case(COMMAND_NAME) => Some(words.collect()),
        _ => None,
    }
}

fn console_command(config: &ConfigHandle, line: &str) {
    if line.trim().is_empty() {
        return;
    }
    match parse_console(line) {
        Some(args) => println!("{}", command::execute(config, &CommandSender::Console, &args)),
        None => println!("Unknown command. Try /{COMMAND_NAME} reload"),
    }
}

fn print_summary(server: &Server, stats: &SpawnStats) {
    let mut by_kind: BTreeMap<EntityKind, usize> = BTreeMap::new();
    for entity in server.entities().values() {
        *by_kind.entry(entity.kind).or_default() += 1;
    }
    let (mut removed, mut renamed) = (0usize, 0usize);
    for event in server.events() {
        match event {
            ServerEvent::Removed { .. } => removed += 1,
            ServerEvent::Renamed { .. } => renamed += 1,
            _ => {}
        }
    }

    println!(
        "Simulation: tick={}, seed={}, entities={}, observers={}",
        server.tick(),
        server.seed(),
        server.entity_count(),
        server.observer_count()
    );
    println!(
        "Spawns: allowed={}, denied={}, renamed={}",
        stats.allowed(),
        stats.denied(),
        stats.renamed()
    );
    println!("Limiter: removed={removed}, renames={renamed}");
    for (kind, count) in by_kind {
        println!("  {kind}: {count}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn console_accepts_slash_and_bare_forms() {
        assert_eq!(parse_console("popguard reload"), Some(vec!["reload"]));
        assert_eq!(parse_console("/PopGuard reload"), Some(vec!["reload"]));
        assert_eq!(parse_console("  /popguard  "), Some(vec![]));
        assert_eq!(parse_console("stop"), None);
        assert_eq!(parse_console(""), None);
    }

    #[test]
    fn random_spawns_stay_in_the_world() {
        let mut server = Server::with_seed(1);
        server.add_world(WORLD, WORLD_SPAWN);
        let anchors = vec![Location::new(WORLD, 300.0, 64.0, 300.0)];
        for _ in 0..200 {
            spawn_random(&mut server, &anchors).unwrap();
        }
        assert_eq!(server.entity_count(), 200);
        assert!(server.entities().values().all(|e| e.location.world == WORLD));
    }
}
