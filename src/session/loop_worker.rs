use std::time::Duration;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    sync::mpsc,
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tokio_util::sync::CancellationToken;

use crate::{
    capture::FrameSource, hardware::HardwareCommand, phone::VisionClassifier,
    telemetry::TelemetryClient,
};

use super::{ControlAction, SessionOrchestrator};

const ENABLE_LOGS: bool = true;
const LOG_TAG: &str = "frame-loop";

use crate::{log_error, log_info, log_warn};

/// Maps one line typed on stdin to an action.
pub fn parse_keyboard(line: &str) -> Option<ControlAction> {
    let line = line.trim();
    if let Some(name) = line.strip_prefix("mode ") {
        let name = name.trim();
        // Same rules as a mode sent by the board.
        return HardwareCommand::parse(&format!("MODE_CHANGE:{name}")).map(ControlAction::from);
    }

    let action = match line {
        "s" => ControlAction::ToggleRunning,
        "r" => HardwareCommand::Reset.into(),
        "c" => ControlAction::Calibrate,
        "m" => ControlAction::ToggleMute,
        "+" => HardwareCommand::VolumeUp.into(),
        "-" => HardwareCommand::VolumeDown.into(),
        "p" => HardwareCommand::MusicPlayPause.into(),
        "n" => HardwareCommand::MusicSkip.into(),
        "q" => ControlAction::Quit,
        _ => return None,
    };
    Some(action)
}

/// Forwards parsed keyboard lines from `input` until it closes or the receiver goes away.
pub fn spawn_keyboard_reader<R>(
    input: R,
    tx: mpsc::UnboundedSender<ControlAction>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(input).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => match parse_keyboard(&line) {
                    Some(action) => {
                        if tx.send(action).is_err() {
                            break;
                        }
                    }
                    None if line.trim().is_empty() => {}
                    None => log_warn!("unknown key command {:?}", line.trim()),
                },
                Ok(None) => break,
                Err(err) => {
                    log_error!("keyboard input failed: {err}");
                    break;
                }
            }
        }
    })
}

/// Pulls one frame per tick and feeds it through the orchestrator until the stream ends,
/// `q` is entered, Ctrl-C arrives or `cancel_token` fires. Hardware commands are polled once
/// per tick before the frame.
pub async fn run_frame_loop<C, T, S>(
    orchestrator: &mut SessionOrchestrator<C, T>,
    source: &mut S,
    frame_interval: Duration,
    mut actions: mpsc::UnboundedReceiver<ControlAction>,
    cancel_token: CancellationToken,
) -> usize
where
    C: VisionClassifier,
    T: TelemetryClient,
    S: FrameSource + ?Sized,
{
    let mut ticker = tokio::time::interval(frame_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut frames = 0usize;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                orchestrator.poll_hardware();
                match source.next_frame() {
                    Ok(Some(frame)) => {
                        orchestrator.process_frame(&frame).await;
                        frames += 1;
                    }
                    Ok(None) => {
                        log_info!("frame stream ended after {frames} frames");
                        break;
                    }
                    Err(err) => {
                        log_error!("frame source failed: {err:#}");
                        break;
                    }
                }
            }
            Some(action) = actions.recv() => {
                if action == ControlAction::Quit {
                    log_info!("quit requested");
                    break;
                }
                orchestrator.apply(action);
            }
            _ = &mut ctrl_c => {
                log_info!("interrupted");
                break;
            }
            _ = cancel_token.cancelled() => {
                log_info!("frame loop shutting down");
                break;
            }
        }
    }
    frames
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::ReplaySource;
    use crate::session::orchestrator::tests::rig_with_serial;
    use crate::telemetry::SessionLifecycle;

    #[test]
    fn keyboard_map() {
        assert_eq!(parse_keyboard("s"), Some(ControlAction::ToggleRunning));
        assert_eq!(parse_keyboard(" r \n"), Some(HardwareCommand::Reset.into()));
        assert_eq!(parse_keyboard("c"), Some(ControlAction::Calibrate));
        assert_eq!(parse_keyboard("m"), Some(ControlAction::ToggleMute));
        assert_eq!(parse_keyboard("+"), Some(HardwareCommand::VolumeUp.into()));
        assert_eq!(parse_keyboard("-"), Some(HardwareCommand::VolumeDown.into()));
        assert_eq!(parse_keyboard("p"), Some(HardwareCommand::MusicPlayPause.into()));
        assert_eq!(parse_keyboard("n"), Some(HardwareCommand::MusicSkip.into()));
        assert_eq!(parse_keyboard("q"), Some(ControlAction::Quit));
        assert_eq!(
            parse_keyboard("mode DEEP WORK"),
            Some(HardwareCommand::ModeChange("DEEP WORK".into()).into())
        );
        assert_eq!(parse_keyboard("mode a|b"), None);
        assert_eq!(parse_keyboard("mode  "), None);
        assert_eq!(parse_keyboard("x"), None);
    }

    const FEED: &str = r#"{"width":320,"height":240,"poses":[]}
{"width":320,"height":240,"poses":[]}
{"width":320,"height":240,"poses":[]}
"#;

    #[tokio::test(start_paused = true)]
    async fn loop_runs_until_the_stream_ends() {
        let mut rig = rig_with_serial("").await;
        let mut source = ReplaySource::from_reader(std::io::Cursor::new(FEED));
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(ControlAction::ToggleRunning).unwrap();

        let frames = run_frame_loop(
            &mut rig.orchestrator,
            &mut source,
            Duration::from_millis(100),
            rx,
            CancellationToken::new(),
        )
        .await;

        assert_eq!(frames, 3);
        assert!(rig.orchestrator.session().is_running());
        assert_eq!(rig.serial_out.contents().lines().count(), 3);
        rig.orchestrator.shutdown().await;
        assert_eq!(
            *rig.aggregator.lifecycle.lock().unwrap(),
            vec![SessionLifecycle::Toggle]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn quit_and_cancel_stop_the_loop() {
        let mut rig = rig_with_serial("").await;
        let mut source = ReplaySource::from_reader(std::io::Cursor::new(FEED));

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(ControlAction::Quit).unwrap();
        run_frame_loop(
            &mut rig.orchestrator,
            &mut source,
            Duration::from_millis(100),
            rx,
            CancellationToken::new(),
        )
        .await;

        let (_tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let frames = run_frame_loop(
            &mut rig.orchestrator,
            &mut source,
            Duration::from_millis(100),
            rx,
            cancel,
        )
        .await;
        assert!(frames <= 1);
    }

    #[tokio::test]
    async fn keyboard_reader_forwards_known_commands() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let input: &[u8] = b"s\nbogus\n\nmode BREAK\nq\n";
        spawn_keyboard_reader(input, tx).await.unwrap();

        let mut received = Vec::new();
        while let Ok(action) = rx.try_recv() {
            received.push(action);
        }
        assert_eq!(
            received,
            vec![
                ControlAction::ToggleRunning,
                HardwareCommand::ModeChange("BREAK".into()).into(),
                ControlAction::Quit,
            ]
        );
    }
}
