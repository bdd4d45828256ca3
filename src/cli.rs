// SPDX-License-Identifier: GPL-3.0-only

//! Headless commands
//!
//! - Listing cameras with their facing and rotation
//! - Running one scan session and printing the reply as JSON
//! - Decoding image files directly

use scanner::backends::camera::image_files::load_image_as_frame;
use scanner::backends::camera::{CameraDevice, SensorRotation};
use scanner::backends::permission::{RationaleChoice, RationalePrompt};
use scanner::constants::exit_codes;
use scanner::fl;
use scanner::launcher::SessionFactory;
use scanner::scanner::{Decoder, ScanStatus};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

/// List cameras the configured source can see
pub fn list_cameras(factory: &SessionFactory) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let camera = factory.camera();
    let cameras = camera.enumerate_cameras();

    if cameras.is_empty() {
        println!("No cameras found.");
        return Ok(ExitCode::SUCCESS);
    }

    let selected = factory.config().selector().select(&cameras).cloned();

    println!("Available cameras ({}):", camera.backend_type());
    println!();
    for (index, device) in cameras.iter().enumerate() {
        let marker = if selected.as_ref() == Some(device) {
            "*"
        } else {
            " "
        };
        print_camera(index, marker, device);
    }
    if selected.is_none() {
        println!("No camera is eligible for scanning (front-facing cameras are never used).");
    }

    Ok(ExitCode::SUCCESS)
}

fn print_camera(index: usize, marker: &str, device: &CameraDevice) {
    println!("{} [{}] {}", marker, index, device.name);
    if !device.path.is_empty() {
        println!("      Path: {}", device.path);
    }
    println!(
        "      Facing: {} | Rotation: {}",
        device.facing, device.rotation
    );
}

/// Run one scan session and print the reply
///
/// Ctrl+C cancels the session. The exit code follows the result status.
pub fn scan(factory: SessionFactory) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let result = run_detached(async move {
        let mut handle = factory.start(ConsolePrompt, None);
        let mut state = handle.subscribe();

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                eprintln!("Cancelling scan...");
                handle.cancel();
            }
            _ = state.wait_for(|s| s.is_resolved()) => {}
        }

        handle.outcome().await
    })?;

    println!("{}", serde_json::to_string(&result.reply())?);

    let code = match result.status() {
        ScanStatus::Success => exit_codes::SUCCESS,
        ScanStatus::Error => {
            if let Some(message) = result.message() {
                eprintln!("Scan failed: {}", message);
            }
            exit_codes::ERROR
        }
        ScanStatus::Cancelled => exit_codes::CANCELLED,
    };
    Ok(ExitCode::from(code))
}

/// Run `future` on a fresh runtime without waiting for leftover blocking tasks
///
/// A console prompt still reading stdin after Ctrl+C would otherwise keep
/// the process alive until Enter is pressed.
fn run_detached<F: Future>(future: F) -> io::Result<F::Output> {
    let runtime = tokio::runtime::Runtime::new()?;
    let output = runtime.block_on(future);
    runtime.shutdown_background();
    Ok(output)
}

/// Decode image files and print every detection
pub fn decode_images(
    factory: &SessionFactory,
    paths: &[PathBuf],
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let decoder = factory.config().decoder();
    let mut found = 0;

    for path in paths {
        let frame = match load_image_as_frame(path) {
            Ok(frame) => frame,
            Err(e) => {
                eprintln!("{}: {}", path.display(), e);
                continue;
            }
        };

        match decoder.decode(&frame, SensorRotation::None) {
            Ok(records) if records.is_empty() => {
                println!("{}: no barcode found", path.display());
            }
            Ok(records) => {
                for record in &records {
                    println!(
                        "{}: [{} / {}] {}",
                        path.display(),
                        record.format,
                        record.value_type.label(),
                        record.raw_value
                    );
                }
                found += records.len();
            }
            Err(e) => eprintln!("{}: {}", path.display(), e),
        }
    }

    Ok(if found > 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(exit_codes::ERROR)
    })
}

/// Rationale prompt on stderr, answered on stdin
struct ConsolePrompt;

impl RationalePrompt for ConsolePrompt {
    async fn explain(&self) -> RationaleChoice {
        let answer = tokio::task::spawn_blocking(|| -> io::Result<String> {
            let mut stderr = io::stderr().lock();
            writeln!(stderr, "{}", fl!("camera-permission-needed"))?;
            writeln!(stderr, "{}", fl!("app-needs-camera-permission"))?;
            write!(stderr, "Continue? [y/N] ")?;
            stderr.flush()?;

            let mut line = String::new();
            io::stdin().lock().read_line(&mut line)?;
            Ok(line)
        })
        .await;

        match answer {
            Ok(Ok(line)) if matches!(line.trim(), "y" | "Y" | "yes") => RationaleChoice::Continue,
            _ => RationaleChoice::Decline,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_pending_blocking_task_does_not_hold_exit() {
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let (done_tx, done_rx) = mpsc::channel();

        std::thread::spawn(move || {
            let output = run_detached(async move {
                // Stands in for a stdin read nobody answers
                drop(tokio::task::spawn_blocking(move || release_rx.recv()));
                "cancelled"
            });
            let _ = done_tx.send(output.map_err(|e| e.to_string()));
        });

        let output = done_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("runtime shut down without waiting");
        assert_eq!(output, Ok("cancelled"));
        let _ = release_tx.send(());
    }
}
