/// A command line sent by the microcontroller. Closed set; anything else is ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HardwareCommand {
    Start,
    Stop,
    Reset,
    VolumeUp,
    VolumeDown,
    MusicPlayPause,
    MusicSkip,
    ModeChange(String),
}

const MODE_PREFIX: &str = "MODE_CHANGE:";
/// Lines this short are serial noise (stray CR/LF, half-initialised UART).
const MIN_LINE_LEN: usize = 3;

impl HardwareCommand {
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.len() < MIN_LINE_LEN {
            return None;
        }

        let command = match line {
            "CMD_START" => HardwareCommand::Start,
            "CMD_STOP" => HardwareCommand::Stop,
            "CMD_RESET" => HardwareCommand::Reset,
            "CMD_VOL_UP" => HardwareCommand::VolumeUp,
            "CMD_VOL_DOWN" => HardwareCommand::VolumeDown,
            "CMD_MUSIC_PP" => HardwareCommand::MusicPlayPause,
            "CMD_MUSIC_SKIP" => HardwareCommand::MusicSkip,
            other => {
                let name = other.strip_prefix(MODE_PREFIX)?.trim();
                // The name is echoed back inside the pipe-delimited status line.
                if name.is_empty() || name.contains(['|', '\n', '\r']) {
                    return None;
                }
                HardwareCommand::ModeChange(name.to_string())
            }
        };
        Some(command)
    }
}
