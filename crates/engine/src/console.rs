use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use common::OperatorCommand;

use crate::scheduler::SchedulerHandle;

/// Read operator commands from stdin and forward them to the scheduler.
/// The task ends when stdin closes or the scheduler is gone.
pub fn spawn_console(handle: SchedulerHandle) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Console ready, type ? for help");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match line.parse::<OperatorCommand>() {
                        Ok(cmd) => {
                            if !handle.send(cmd).await {
                                break;
                            }
                        }
                        Err(e) => println!("{e}, type ? for help"),
                    }
                }
                Ok(None) => {
                    info!("stdin closed, console stopped");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "Console read failed");
                    break;
                }
            }
        }
    })
}
