use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use slotlink_cu::{ControlUnit, CuConfig, PollEvent};

use crate::cmd::{parse_duration, parse_timeout, PollArgs};
use crate::exit::{cu_error, CliError, CliResult, SUCCESS};
use crate::output::{print_event, OutputFormat};

pub fn run(args: PollArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_timeout(&args.timeout)?;
    let interval = parse_duration(&args.interval)?;

    let mut cu = ControlUnit::open(&args.device)
        .map_err(|err| cu_error("open failed", err))?
        .with_config(CuConfig::default().with_request_timeout(timeout));

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut printed = 0usize;

    while running.load(Ordering::SeqCst) {
        let event = cu
            .poll()
            .map_err(|err| cu_error("poll failed", err))?;

        let wanted = match &event {
            PollEvent::Timer(_) => !args.status_only,
            PollEvent::Status(_) => !args.timer_only,
        };

        if wanted {
            print_event(&event, format);
            printed = printed.saturating_add(1);

            if let Some(count) = args.count {
                if printed >= count {
                    break;
                }
            }
        }

        if !interval.is_zero() {
            thread::sleep(interval);
        }
    }

    cu.close().map_err(|err| cu_error("close failed", err))?;
    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}
