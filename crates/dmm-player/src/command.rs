//! Console commands forwarded from the stdin thread to the engine loop

use anyhow::{Context, Result, bail};

/// Ring buffer capacity between the stdin thread and the engine loop
pub const COMMAND_QUEUE_SIZE: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerCommand {
    Play(String),
    Random,
    Stop,
    Intensity(u8),
    CombatStart,
    CombatEnd,
    /// Combat round update; `None` when the encounter is gone
    Round(Option<u32>),
    NowPlaying,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  play <song>        play a song by name
  random             play a random ambient song
  stop               stop playback
  intensity <1-4>    set the intensity level
  combat start|end   enter or leave combat
  round <n>|none     combat round update
  now                print the current mix
  quit";

impl PlayerCommand {
    /// Parse one console line; blank lines yield `None`
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        let command = match word.to_ascii_lowercase().as_str() {
            "play" => {
                if rest.is_empty() {
                    bail!("play needs a song name");
                }
                PlayerCommand::Play(rest.to_string())
            }
            "random" => PlayerCommand::Random,
            "stop" => PlayerCommand::Stop,
            "intensity" | "i" => {
                let level = rest
                    .parse::<u8>()
                    .with_context(|| format!("invalid intensity '{}'", rest))?;
                PlayerCommand::Intensity(level)
            }
            "combat" => match rest {
                "start" => PlayerCommand::CombatStart,
                "end" => PlayerCommand::CombatEnd,
                other => bail!("expected 'combat start' or 'combat end', got '{}'", other),
            },
            "round" => match rest {
                "none" | "" => PlayerCommand::Round(None),
                n => PlayerCommand::Round(Some(
                    n.parse::<u32>()
                        .with_context(|| format!("invalid round '{}'", n))?,
                )),
            },
            "now" => PlayerCommand::NowPlaying,
            "help" | "?" => PlayerCommand::Help,
            "quit" | "exit" | "q" => PlayerCommand::Quit,
            other => bail!("unknown command '{}' (try 'help')", other),
        };

        Ok(Some(command))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_play_keeps_spaces() {
        assert_eq!(
            PlayerCommand::parse("play  Sylvan Stillness ").unwrap(),
            Some(PlayerCommand::Play("Sylvan Stillness".to_string()))
        );
    }

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(PlayerCommand::parse("STOP").unwrap(), Some(PlayerCommand::Stop));
        assert_eq!(PlayerCommand::parse("i 3").unwrap(), Some(PlayerCommand::Intensity(3)));
        assert_eq!(
            PlayerCommand::parse("combat start").unwrap(),
            Some(PlayerCommand::CombatStart)
        );
        assert_eq!(
            PlayerCommand::parse("round 2").unwrap(),
            Some(PlayerCommand::Round(Some(2)))
        );
        assert_eq!(
            PlayerCommand::parse("round none").unwrap(),
            Some(PlayerCommand::Round(None))
        );
        assert_eq!(PlayerCommand::parse("   ").unwrap(), None);
    }

    #[test]
    fn test_parse_errors() {
        assert!(PlayerCommand::parse("play").is_err());
        assert!(PlayerCommand::parse("intensity loud").is_err());
        assert!(PlayerCommand::parse("combat maybe").is_err());
        assert!(PlayerCommand::parse("dance").is_err());
    }
}
