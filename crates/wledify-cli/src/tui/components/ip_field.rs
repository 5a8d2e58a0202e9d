//! Single-line editor for the WLED device address

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// Result of feeding one key to the editor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IpAction {
    Continue,
    Save(String),
    Cancel,
}

#[derive(Debug, Clone, Default)]
pub struct IpField {
    value: Vec<char>,
    /// Char index, 0..=value.len()
    cursor: usize,
}

impl IpField {
    pub fn new(initial: &str) -> Self {
        let value: Vec<char> = initial.chars().collect();
        let cursor = value.len();
        Self { value, cursor }
    }

    pub fn value(&self) -> String {
        self.value.iter().collect()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> IpAction {
        match key.code {
            KeyCode::Enter => return IpAction::Save(self.value().trim().to_string()),
            KeyCode::Esc => return IpAction::Cancel,
            KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.value.drain(..self.cursor);
                self.cursor = 0;
            }
            KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                // Any address form is accepted; only blanks are kept out
                if !c.is_whitespace() && !c.is_control() {
                    self.value.insert(self.cursor, c);
                    self.cursor += 1;
                }
            }
            KeyCode::Backspace if self.cursor > 0 => {
                self.cursor -= 1;
                self.value.remove(self.cursor);
            }
            KeyCode::Delete if self.cursor < self.value.len() => {
                self.value.remove(self.cursor);
            }
            KeyCode::Left => self.cursor = self.cursor.saturating_sub(1),
            KeyCode::Right => self.cursor = (self.cursor + 1).min(self.value.len()),
            KeyCode::Home => self.cursor = 0,
            KeyCode::End => self.cursor = self.value.len(),
            _ => {}
        }
        IpAction::Continue
    }
}
