use anyhow::{Context, Result, anyhow};
use pico_args::Arguments;
use std::{
    env,
    fs::File,
    io::{self, BufReader},
    path::PathBuf,
};

use crate::clock::ManualClock;
use crate::config::ProfileStore;
use crate::landmarks::{DetectError, LandmarkSource};
use crate::live;
use crate::replay::{self, FrameQueue, JsonLinesSink, Pacing};
use crate::session::{NullSink, RenderSink, Session};

pub fn run() -> Result<()> {
    let mut pargs = Arguments::from_env();

    // No args -> general help
    if env::args().len() == 1 {
        print_help();
        return Ok(());
    }

    if pargs.contains("-h") || pargs.contains("--help") {
        print_help();
        return Ok(());
    }

    let subcmd: Option<String> = pargs.free_from_str().ok();

    match subcmd.as_deref() {
        Some("help") => {
            let topic: Option<String> = pargs.free_from_str().ok();
            if let Some(t) = topic {
                print_subcmd_help(&t);
            } else {
                print_help();
            }
            Ok(())
        }

        Some("replay") => {
            let profile: Option<String> = pargs.opt_value_from_str("--profile")?;
            let fps: Option<f64> = pargs.opt_value_from_str("--fps")?;
            let out: Option<PathBuf> = pargs.opt_value_from_str("--out")?;
            let quiet = pargs.contains("--quiet");
            let input: PathBuf = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: pinchgrab replay <frames.jsonl> [--profile NAME] [--fps N] [--out FILE]"))?;
            cmd_replay(input, profile, fps, out, quiet)
        }

        Some("run") => {
            let profile: Option<String> = pargs.opt_value_from_str("--profile")?;
            let watch = pargs.contains("--watch");
            let store = ProfileStore::load_or_install_default()?;
            live::run_live(store, profile, watch)
        }

        Some("use") => {
            let name: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: pinchgrab use <profile_name>"))?;
            let mut store = ProfileStore::load_or_install_default()?;
            store.set_active(&name)?;
            print_response(&serde_json::json!({"ok": true, "data": {"active_profile": store.active_name}}));
            Ok(())
        }

        Some("list") => {
            let store = ProfileStore::load_or_install_default()?;
            let list = store.list_profiles();
            print_response(&serde_json::json!({"ok": true, "data": {"profiles": list, "active": store.active_name}}));
            Ok(())
        }

        Some("show") => {
            let name: Option<String> = pargs.free_from_str().ok();
            let store = ProfileStore::load_or_install_default()?;
            let profile = match name {
                Some(n) => store.load_named(&n)?,
                None => store.profile.clone(),
            };
            print_response(&serde_json::to_value(&profile)?);
            Ok(())
        }

        Some("doctor") => {
            let store = ProfileStore::load_or_install_default()?;
            print_response(&serde_json::json!({"ok": true, "data": store.doctor_report()}));
            Ok(())
        }

        Some(other) => {
            eprintln!("unknown subcommand: {other}\n");
            print_help();
            Ok(())
        }

        None => {
            print_help();
            Ok(())
        }
    }
}

fn cmd_replay(
    input: PathBuf,
    profile: Option<String>,
    fps: Option<f64>,
    out: Option<PathBuf>,
    quiet: bool,
) -> Result<()> {
    let store = ProfileStore::load_or_install_default()?;
    let profile = match profile {
        Some(name) => store.load_named(&name)?,
        None => store.profile.clone(),
    };

    let pacing = match fps {
        Some(f) if f > 0.0 => Pacing::Fixed {
            frame_ms: 1000.0 / f,
        },
        Some(f) => return Err(anyhow!("--fps must be positive, got {f}")),
        None => Pacing::Timestamps,
    };

    let sink: Box<dyn RenderSink> = match (out, quiet) {
        (_, true) => Box::new(NullSink),
        (Some(path), false) => {
            let file = File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Box::new(JsonLinesSink::new(io::BufWriter::new(file)))
        }
        (None, false) => Box::new(JsonLinesSink::new(io::stdout())),
    };

    let reader = BufReader::new(
        File::open(&input).with_context(|| format!("failed to open {}", input.display()))?,
    );

    let queue = FrameQueue::default();
    let mut session = Session::new(&profile, ManualClock::new(0.0), sink);
    let source: Box<dyn LandmarkSource> = Box::new(queue.source());
    session.attach_source::<DetectError>(Ok(source));

    let summary = replay::run_replay(reader, &mut session, &queue, pacing)
        .with_context(|| format!("replay of {} failed", input.display()))?;
    eprintln!("{}", serde_json::to_string_pretty(&summary).unwrap_or_default());
    Ok(())
}

fn print_help() {
    println!(
        r#"pinchgrab - pinch to grab, release to return

USAGE:
  pinchgrab help [command]                  Show general or command-specific help
  pinchgrab replay <frames.jsonl> [opts]    Run a recorded landmark stream
  pinchgrab run [--profile NAME] [--watch]  Read frames on stdin, write transforms on stdout
  pinchgrab use <name>                      Switch active profile
  pinchgrab list                            List profiles
  pinchgrab show [name]                     Print a profile with defaults filled in
  pinchgrab doctor                          Check profiles and clip resolution

TIPS:
  - Profiles: ~/.config/pinchgrab/profiles
  - Active profile pointer: ~/.config/pinchgrab/active
  - RUST_LOG=debug shows per-frame detail
"#
    );
}

fn print_subcmd_help(cmd: &str) {
    match cmd {
        "replay" => println!(
            "usage: pinchgrab replay <frames.jsonl> [--profile NAME] [--fps N] [--out FILE] [--quiet]\n\
             Feeds each JSON line (a hand frame or a {{\"cmd\": ...}} object) through a session.\n\
             Without --fps the clock follows each frame's timestamp_ms."
        ),
        "run" => println!(
            "usage: pinchgrab run [--profile NAME] [--watch]\n\
             Live mode. --watch reloads the profile when its file changes; Ctrl-C stops.\n\
             Gaps under 250 ms between frames keep a grab; longer silence counts as no hand."
        ),
        "use" => {
            println!("usage: pinchgrab use <name>\nSwitches active profile to <name>.")
        }
        "list" => println!("usage: pinchgrab list\nLists available profiles."),
        "show" => println!("usage: pinchgrab show [name]\nPrints the active or named profile as JSON."),
        "doctor" => println!(
            "usage: pinchgrab doctor\nValidates every profile and reports clips missing per model."
        ),
        _ => {
            eprintln!("unknown command: {cmd}\n");
            print_help();
        }
    }
}

fn print_response(v: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(v).unwrap_or_default());
}
