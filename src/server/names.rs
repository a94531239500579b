//! Game and player name rules

use rand::distr::Alphanumeric;
use rand::Rng;
use regex::Regex;

use crate::config::GatewayConfig;

/// Compiled name expressions for games and players
#[derive(Debug, Clone)]
pub struct NamePolicy {
    game: Regex,
    player: Regex,
    max_game_name_length: usize,
}

impl NamePolicy {
    /// Build the policy from validated configuration
    pub fn new(config: &GatewayConfig) -> Result<Self, regex::Error> {
        Ok(Self {
            game: word_pattern(config.min_game_name_length, config.max_game_name_length)?,
            player: word_pattern(
                config.min_player_name_length,
                config.max_player_name_length,
            )?,
            max_game_name_length: config.max_game_name_length,
        })
    }

    pub fn game(&self) -> &Regex {
        &self.game
    }

    pub fn player(&self) -> &Regex {
        &self.player
    }

    pub fn is_valid_game(&self, name: &str) -> bool {
        self.game.is_match(name)
    }

    pub fn is_valid_player(&self, name: &str) -> bool {
        self.player.is_match(name)
    }

    /// Random game name of the maximum allowed length
    pub fn generate_game_name(&self) -> String {
        random_alphanumeric(self.max_game_name_length)
    }
}

fn word_pattern(min: usize, max: usize) -> Result<Regex, regex::Error> {
    Regex::new(&format!(r"^(?-u:\w){{{},{}}}$", min, max))
}

/// Random ASCII letters and digits
pub fn random_alphanumeric(length: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> NamePolicy {
        NamePolicy::new(&GatewayConfig {
            min_game_name_length: 5,
            max_game_name_length: 10,
            min_player_name_length: 2,
            max_player_name_length: 4,
            ..GatewayConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_game_name_length_bounds() {
        let policy = policy();
        assert!(!policy.is_valid_game("ab"));
        assert!(policy.is_valid_game("abcde"));
        assert!(policy.is_valid_game("abcde_1234"));
        assert!(!policy.is_valid_game("abcde_12345"));
    }

    #[test]
    fn test_rejects_non_word_characters() {
        let policy = policy();
        assert!(!policy.is_valid_player("a-b"));
        assert!(!policy.is_valid_player("a b"));
        assert!(!policy.is_valid_player("ąę"));
        assert!(policy.is_valid_player("p_1"));
    }

    #[test]
    fn test_pattern_is_anchored() {
        let policy = policy();
        assert!(!policy.is_valid_player("ok/../bad"));
        assert_eq!(policy.player().as_str(), r"^(?-u:\w){2,4}$");
    }

    #[test]
    fn test_generated_name_is_valid() {
        let policy = policy();
        let name = policy.generate_game_name();
        assert_eq!(name.len(), 10);
        assert!(name.chars().all(|c| c.is_ascii_alphanumeric()));
        assert!(policy.is_valid_game(&name));
    }

    #[test]
    fn test_random_alphanumeric_length() {
        assert_eq!(random_alphanumeric(0), "");
        assert_eq!(random_alphanumeric(32).len(), 32);
    }
}
