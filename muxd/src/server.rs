//! The standalone driver loop: load or bootstrap the world, read
//! command lines on stdin as God, advance the queue once per line and
//! once per second of wall clock, checkpoint on the configured
//! interval, and honor @shutdown / @restart.

use std::io::{BufRead, Write};
use std::path::Path;

use tracing::{info, warn};

use common::config::MuxConfig;
use common::err::CResult;
use common::strings::render_ansi;
use interp::command::{process_command, tick};
use interp::game::{Ctx, Game};
use world::{flatfile, GOD};

use crate::CliArgs;

pub enum Outcome {
    Shutdown,
    Restart,
}

pub fn run(mut config: MuxConfig, args: &CliArgs) -> CResult<Outcome> {
    crate::merge(&mut config, args)?;
    let started = std::time::Instant::now();

    let mut game = if args.standalone {
        Game::new_in_memory(config.clone())
    } else {
        Game::with_store(config.clone())?
    };

    let indb = config.base.indb_path();
    if Path::new(&indb).exists() {
        flatfile::load_into(&mut game.world, &indb)?;
        info!(path = %indb, "database loaded");
    } else {
        game.bootstrap()?;
        info!("fresh database bootstrapped");
    }

    write_pid_file(&config.base.pid_file)?;

    let outcome = stdin_loop(&mut game, &config)?;

    // Final checkpoint on the way down.
    let outdb = config.base.outdb_path();
    if let Err(e) = flatfile::dump(&mut game.world, &outdb) {
        warn!(error = %e, "final checkpoint failed");
    }
    let _ = std::fs::remove_file(&config.base.pid_file);
    info!(
        uptime = %pretty_duration::pretty_duration(&started.elapsed(), None),
        "going down"
    );

    match outcome {
        Outcome::Restart => {
            // Redesigned restart path: the dump above is the handoff
            // state; a fresh process takes over and this one exits.
            respawn(args)?;
            Ok(Outcome::Restart)
        }
        Outcome::Shutdown => Ok(Outcome::Shutdown),
    }
}

fn stdin_loop(game: &mut Game, config: &MuxConfig) -> CResult<Outcome> {
    let stdin = std::io::stdin();
    let mut last_dump = world::db::now_secs();
    let ctx = Ctx::acting_alone(GOD);

    for line in stdin.lock().lines() {
        let line = line?;
        let now = world::db::now_secs();

        process_command(game, &ctx, &line);
        tick(game, now);
        flush_outbox(game);

        if now - last_dump >= config.base.dump_interval as i64 {
            let outdb = config.base.outdb_path();
            if let Err(e) = flatfile::dump(&mut game.world, &outdb) {
                warn!(error = %e, "periodic checkpoint failed");
            }
            last_dump = now;
        }

        if !game.running {
            return Ok(if game.restart_requested {
                Outcome::Restart
            } else {
                Outcome::Shutdown
            });
        }
    }

    // EOF on stdin: drain whatever the queue still holds, then leave.
    let mut idle_ticks = 0;
    while !game.queue.is_empty() && idle_ticks < 3600 {
        let now = world::db::now_secs() + idle_ticks;
        tick(game, now);
        flush_outbox(game);
        idle_ticks += 1;
        if !game.running {
            break;
        }
    }
    Ok(if game.restart_requested {
        Outcome::Restart
    } else {
        Outcome::Shutdown
    })
}

/// Standalone output sink: rendered lines go to stdout with the dbref
/// of the recipient, color transcribed to real escapes.
fn flush_outbox(game: &mut Game) {
    let msgs = game.outbox.drain();
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for (who, text) in msgs {
        let _ = writeln!(out, "[#{}] {}", who, render_ansi(&text));
    }
    let _ = out.flush();
}

fn write_pid_file(path: &str) -> CResult<()> {
    std::fs::write(path, format!("{}\n", std::process::id()))?;
    Ok(())
}

/// Spawn a fresh server against the flatfile just written, passing the
/// same config and pid arguments. The child owns the world from here.
fn respawn(args: &CliArgs) -> CResult<()> {
    let exe = std::env::current_exe()?;
    let mut cmd = std::process::Command::new(exe);
    if let Some(cfg) = args.config.as_ref() {
        cmd.arg("-c").arg(cfg);
    }
    if let Some(pid) = args.pid_file.as_ref() {
        cmd.arg("-p").arg(pid);
    }
    if args.standalone {
        cmd.arg("-s");
    }
    if args.debug {
        cmd.arg("-d");
    }
    let child = cmd.spawn()?;
    info!(pid = child.id(), "restart child spawned");
    Ok(())
}
