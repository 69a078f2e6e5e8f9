use crate::models::Letter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCommand {
    Select(Letter),
    Retreat,
    Advance,
    ToggleShowAnswer,
    /// Goes to the next question, but only while a next action is offered.
    Continue,
}

/// Maps a key name (as reported by a browser `KeyboardEvent.key`) to a command.
pub fn command_for_key(key: &str) -> Option<KeyCommand> {
    match key {
        "ArrowLeft" => return Some(KeyCommand::Retreat),
        "ArrowRight" => return Some(KeyCommand::Advance),
        " " | "Space" | "Spacebar" => return Some(KeyCommand::ToggleShowAnswer),
        "Enter" => return Some(KeyCommand::Continue),
        _ => {}
    }

    let mut chars = key.chars();
    let c = match (chars.next(), chars.next()) {
        (Some(c), None) => c,
        _ => return None,
    };
    if let Some(letter) = Letter::from_char(c) {
        return Some(KeyCommand::Select(letter));
    }
    c.to_digit(10)
        .filter(|d| (1..=4).contains(d))
        .and_then(|d| Letter::from_index(d as usize - 1))
        .map(KeyCommand::Select)
}
