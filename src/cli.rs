use anyhow::{Result, anyhow};
use log::{info, warn};
use pico_args::Arguments;
use signal_hook::consts::{SIGINT, SIGTERM};
use std::{
    env,
    io::{self, BufReader},
    path::PathBuf,
    sync::{Arc, atomic::AtomicBool},
    time::Duration,
};

use crate::actions::{InputActuator, MouseButton, UinputSink};
use crate::config::{ConfigStore, Profile};
use crate::gestures::Classifier;
use crate::pipeline::Pipeline;
use crate::source::{self, JsonLines, LandmarkSource, LatestFrame, Next, SocketSource};

const POLL: Duration = Duration::from_millis(50);

pub fn run() -> Result<()> {
    let mut pargs = Arguments::from_env();

    if env::args().len() == 1 || pargs.contains("-h") || pargs.contains("--help") {
        print_help();
        return Ok(());
    }

    let config_dir: Option<PathBuf> = pargs.opt_value_from_str("--config-dir")?;
    let socket: Option<PathBuf> = pargs.opt_value_from_str("--socket")?;
    let listen = pargs.contains("--listen");
    let dry_run = pargs.contains("--dry-run");

    let subcmd: Option<String> = pargs.free_from_str().ok();

    match subcmd.as_deref() {
        Some("help") => {
            let topic: Option<String> = pargs.free_from_str().ok();
            match topic {
                Some(t) => print_subcmd_help(&t),
                None => print_help(),
            }
            Ok(())
        }

        Some("run") => {
            let socket = match (socket, listen) {
                (Some(p), _) => Some(p),
                (None, true) => Some(source::default_socket_path()?),
                (None, false) => None,
            };
            run_loop(config_dir, socket, dry_run)
        }

        Some("classify") => {
            let store = ConfigStore::load_or_install_default(config_dir)?;
            classify_stdin(&store.profile)
        }

        Some("list") => {
            let store = ConfigStore::load_or_install_default(config_dir)?;
            for name in store.list_profiles() {
                let mark = if name == store.active_name { "*" } else { " " };
                println!("{mark} {name}");
            }
            Ok(())
        }

        Some("use") => {
            let name: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: handctl use <profile_name>"))?;
            let mut store = ConfigStore::load_or_install_default(config_dir)?;
            store.set_active(&name)?;
            println!("active profile: {}", store.active_name);
            Ok(())
        }

        Some("show") => {
            let store = ConfigStore::load_or_install_default(config_dir)?;
            print_response(&serde_json::json!({
                "active_profile": store.active_name,
                "path": store.active_path(),
                "profile": store.profile,
            }));
            Ok(())
        }

        Some("doctor") => {
            let store = ConfigStore::load_or_install_default(config_dir)?;
            print_response(&store.doctor_report());
            Ok(())
        }

        Some("emit") => {
            // usage:
            //   handctl emit move 960 540
            //   handctl emit click right
            //   handctl emit scroll -3
            //   handctl emit zoom 2
            let what: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: handctl emit <move|click|scroll|zoom> ..."))?;
            let store = ConfigStore::load_or_install_default(config_dir)?;
            let profile = &store.profile;
            let mut sink = open_sink(profile, dry_run)?;
            match what.as_str() {
                "move" => {
                    let x: i32 = pargs
                        .free_from_str()
                        .map_err(|_| anyhow!("usage: handctl emit move <x> <y>"))?;
                    let y: i32 = pargs
                        .free_from_str()
                        .map_err(|_| anyhow!("usage: handctl emit move <x> <y>"))?;
                    sink.move_to(x, y)?;
                    println!("ok: moved to ({x}, {y})");
                }
                "click" => {
                    let btn: Option<String> = pargs.free_from_str().ok();
                    let button = match btn {
                        Some(b) => MouseButton::parse(&b)?,
                        None => profile.click_button()?,
                    };
                    sink.click(button)?;
                    println!("ok: clicked {button:?}");
                }
                "scroll" => {
                    let steps: i32 = pargs
                        .free_from_str()
                        .map_err(|_| anyhow!("usage: handctl emit scroll <steps>"))?;
                    sink.scroll(steps)?;
                    println!("ok: scrolled {steps}");
                }
                "zoom" => {
                    let steps: i32 = pargs
                        .free_from_str()
                        .map_err(|_| anyhow!("usage: handctl emit zoom <steps>"))?;
                    let key = profile.zoom_modifier()?;
                    sink.key_modifier_scroll(key, steps)?;
                    println!("ok: zoomed {steps} with {key:?}");
                }
                other => return Err(anyhow!("unknown emit kind: {other}")),
            }
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

fn open_sink(profile: &Profile, dry_run: bool) -> Result<UinputSink> {
    if dry_run {
        info!("dry run: actions are logged, not injected");
        return Ok(UinputSink::noop(&profile.screen));
    }
    UinputSink::new(&profile.screen)
}

fn run_loop(config_dir: Option<PathBuf>, socket: Option<PathBuf>, dry_run: bool) -> Result<()> {
    let store = ConfigStore::load_or_install_default(config_dir)?;
    let profile = store.profile.clone();
    info!("active profile '{}'", store.active_name);

    let stop = stop_flag()?;

    let sink = match open_sink(&profile, dry_run) {
        Ok(s) => s,
        Err(e) => {
            warn!("uinput unavailable ({e}); running in NO-OP mode");
            UinputSink::noop(&profile.screen)
        }
    };
    if sink.is_noop() {
        info!("pointer events will be logged at debug level only");
    }

    let raw: Box<dyn LandmarkSource + Send> = match socket {
        Some(path) => Box::new(SocketSource::bind(&path, POLL)?),
        None => {
            info!("reading detector frames from stdin");
            Box::new(JsonLines::new(BufReader::new(io::stdin())))
        }
    };
    let frames: Box<dyn LandmarkSource> = if profile.pipeline.latest_frame_only {
        Box::new(LatestFrame::spawn(raw, Arc::clone(&stop), POLL))
    } else {
        raw
    };

    let mut pipeline = Pipeline::new(frames, sink, &profile)?;
    if let Err(e) = pipeline.watch(store) {
        warn!("profile hot reload disabled: {e}");
    }

    let stats = pipeline.run(&stop)?;
    info!(
        "stopped after {} frames ({} rejected, {} dropped as stale, {} actions, {} reloads)",
        stats.frames, stats.rejected, stats.dropped, stats.actions, stats.reloads
    );
    Ok(())
}

/// The first SIGINT/SIGTERM asks the loop to stop between frames. A second
/// one exits at once, for when a synchronous stdin read is still blocked.
fn stop_flag() -> Result<Arc<AtomicBool>> {
    let stop = Arc::new(AtomicBool::new(false));
    for sig in [SIGINT, SIGTERM] {
        signal_hook::flag::register_conditional_shutdown(sig, 1, Arc::clone(&stop))?;
        signal_hook::flag::register(sig, Arc::clone(&stop))?;
    }
    Ok(stop)
}

/// Classify frames from stdin without touching any input device.
fn classify_stdin(profile: &Profile) -> Result<()> {
    let classifier = Classifier::new(profile.gestures.clone());
    let mut src = JsonLines::new(BufReader::new(io::stdin()));
    loop {
        match src.next_frame()? {
            Next::Frame(f) => {
                let cls = classifier.classify(&f.fingers, &f.landmarks);
                println!(
                    "{}",
                    serde_json::json!({
                        "fingers": f.fingers.as_array(),
                        "landmarks": f.landmarks.len(),
                        "label": cls.label,
                        "pinch_distance": cls.pinch_distance,
                    })
                );
            }
            Next::Rejected(e) => {
                println!("{}", serde_json::json!({ "error": e.to_string() }));
            }
            Next::Idle => {}
            Next::Eof => return Ok(()),
        }
    }
}

fn print_help() {
    println!(
        r#"handctl — hand-gesture cursor control

USAGE:
  handctl help [command]                  Show general or command-specific help
  handctl run [--socket PATH | --listen]  Drive the cursor from detector frames
  handctl classify                        Print the gesture for each frame on stdin
  handctl list                            List profiles
  handctl use <name>                      Switch active profile
  handctl show                            Print the active profile
  handctl doctor                          Diagnose uinput permissions
  handctl emit move <x> <y>               Place the cursor
  handctl emit click [left|right|middle]  Emit a mouse click
  handctl emit scroll <steps>             Emit vertical scroll (+/- steps)
  handctl emit zoom <steps>               Scroll with the zoom modifier held

OPTIONS:
  --config-dir DIR   Use DIR instead of ~/.config/handctl
  --dry-run          Log actions instead of injecting them

FRAMES:
  One JSON object per line:
  {{"fingers":[false,true,false,false,false],"landmarks":[[0,320,400],...],
    "frame_width":640,"frame_height":480}}

TIPS:
  - Profiles: ~/.config/handctl/profiles (edits to the active one apply live)
  - Active profile pointer: ~/.config/handctl/active
  - Default socket for --listen: ~/.local/run/handctl.sock
"#
    );
}

fn print_subcmd_help(cmd: &str) {
    match cmd {
        "run" => println!(
            "usage: handctl run [--socket PATH | --listen] [--dry-run]\nReads frames from stdin, or from detectors connecting to the socket, until EOF or Ctrl-C.\nWith pipeline.latest_frame_only = false a stdin read can block; press Ctrl-C twice to exit."
        ),
        "classify" => println!(
            "usage: handctl classify\nReads frames from stdin and prints fingers, landmark count, label and pinch distance as JSON lines."
        ),
        "list" => {
            println!("usage: handctl list\nLists available profiles; marks active with '*'.")
        }
        "use" => println!("usage: handctl use <name>\nSwitches the active profile to <name>."),
        "show" => println!("usage: handctl show\nPrints the active profile with defaults filled in."),
        "doctor" => println!(
            "usage: handctl doctor\nChecks /dev/uinput and input group membership."
        ),
        "emit" => println!(
            "usage:\n  handctl emit move <x> <y>\n  handctl emit click [left|right|middle]\n  handctl emit scroll <steps>\n  handctl emit zoom <steps>"
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn first_signal_only_raises_the_stop_flag() {
        let stop = stop_flag().unwrap();
        assert!(!stop.load(Ordering::Relaxed));
        signal_hook::low_level::raise(SIGTERM).unwrap();
        assert!(stop.load(Ordering::Relaxed));
    }
}
