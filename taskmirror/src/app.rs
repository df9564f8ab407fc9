//! Application state and event handling for the terminal UI.
//!
//! `App` is presentation glue: it holds a render echo of the task list and
//! the input buffer, and turns key events into [`SyncCommand`] intents for
//! the sync driver. It never mutates the list itself — the list it renders
//! is whatever the core last produced.

use std::sync::Arc;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::runtime::SyncCommand;
use crate::sync::Task;

/// Which panel is currently focused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelFocus {
    /// Input box is focused (default).
    Input,
    /// Task list is focused.
    List,
}

/// Main application state.
pub struct App {
    /// Current text input.
    pub input: String,
    /// Cursor position in input (byte index, kept on char boundaries).
    pub cursor_position: usize,
    /// The mirrored task list, most recently created first.
    pub tasks: Arc<[Task]>,
    /// Selected task index (list focus).
    pub selected: usize,
    /// Which panel is focused.
    pub focus: PanelFocus,
    /// Whether the sync channel is up.
    pub connected: bool,
    /// One-line status message shown in the status bar.
    pub status: String,
    /// Timestamp display format string (chrono).
    pub timestamp_format: String,
    /// Whether the app should quit.
    pub should_quit: bool,
}

impl App {
    /// Create a new application with an empty list.
    #[must_use]
    pub fn new(timestamp_format: String) -> Self {
        Self {
            input: String::new(),
            cursor_position: 0,
            tasks: Arc::new([]),
            selected: 0,
            focus: PanelFocus::Input,
            connected: false,
            status: String::new(),
            timestamp_format,
            should_quit: false,
        }
    }

    /// Replace the rendered list with a fresh snapshot from the core.
    pub fn set_tasks(&mut self, tasks: Arc<[Task]>) {
        self.tasks = tasks;
        if self.selected >= self.tasks.len() {
            self.selected = self.tasks.len().saturating_sub(1);
        }
    }

    /// Clear the input box (submit was accepted).
    pub fn clear_input(&mut self) {
        self.input.clear();
        self.cursor_position = 0;
    }

    /// Set the status line.
    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
    }

    /// Handle a key event, returning a command for the sync driver when the
    /// user action requires one.
    pub fn handle_key_event(&mut self, key: KeyEvent) -> Option<SyncCommand> {
        // Global shortcuts
        match (key.code, key.modifiers) {
            (KeyCode::Char('c'), KeyModifiers::CONTROL) | (KeyCode::Esc, _) => {
                self.should_quit = true;
                return None;
            }
            (KeyCode::Tab | KeyCode::BackTab, _) => {
                self.cycle_focus();
                return None;
            }
            _ => {}
        }

        match self.focus {
            PanelFocus::Input => self.handle_input_key(key),
            PanelFocus::List => self.handle_list_key(key),
        }
    }

    /// Handle key event when the input box is focused.
    fn handle_input_key(&mut self, key: KeyEvent) -> Option<SyncCommand> {
        match key.code {
            KeyCode::Enter => self.submit(),
            KeyCode::Char(c) => {
                self.enter_char(c);
                None
            }
            KeyCode::Backspace => {
                self.delete_char();
                None
            }
            KeyCode::Left => {
                self.move_cursor_left();
                None
            }
            KeyCode::Right => {
                self.move_cursor_right();
                None
            }
            KeyCode::Home => {
                self.cursor_position = 0;
                None
            }
            KeyCode::End => {
                self.cursor_position = self.input.len();
                None
            }
            _ => None,
        }
    }

    /// Handle key event when the task list is focused.
    fn handle_list_key(&mut self, key: KeyEvent) -> Option<SyncCommand> {
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => {
                self.selected = self.selected.saturating_sub(1);
                None
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if self.selected + 1 < self.tasks.len() {
                    self.selected += 1;
                }
                None
            }
            KeyCode::Delete | KeyCode::Char('d') => self.delete_selected(),
            _ => None,
        }
    }

    /// Submit the current input as a new task.
    ///
    /// The core enforces the emptiness rule too; checking here just avoids
    /// a pointless round-trip through the command channel. The input box is
    /// cleared only when the driver reports the submit was accepted.
    fn submit(&mut self) -> Option<SyncCommand> {
        if self.input.trim().is_empty() {
            return None;
        }
        Some(SyncCommand::SubmitTask {
            text: self.input.clone(),
        })
    }

    /// Request deletion of the selected task.
    fn delete_selected(&mut self) -> Option<SyncCommand> {
        let task = self.tasks.get(self.selected)?;
        Some(SyncCommand::DeleteTask {
            id: task.id.clone(),
        })
    }

    /// Cycle focus: Input -> List -> Input.
    const fn cycle_focus(&mut self) {
        self.focus = match self.focus {
            PanelFocus::Input => PanelFocus::List,
            PanelFocus::List => PanelFocus::Input,
        };
    }

    /// Insert a character at the cursor position.
    fn enter_char(&mut self, c: char) {
        self.input.insert(self.cursor_position, c);
        self.cursor_position += c.len_utf8();
    }

    /// Delete the character before the cursor.
    fn delete_char(&mut self) {
        if self.cursor_position == 0 {
            return;
        }
        let Some((start, _)) = self.input[..self.cursor_position].char_indices().next_back()
        else {
            return;
        };
        self.input.remove(start);
        self.cursor_position = start;
    }

    /// Move cursor one character left.
    fn move_cursor_left(&mut self) {
        if let Some((start, _)) = self.input[..self.cursor_position].char_indices().next_back() {
            self.cursor_position = start;
        }
    }

    /// Move cursor one character right.
    fn move_cursor_right(&mut self) {
        if let Some(c) = self.input[self.cursor_position..].chars().next() {
            self.cursor_position += c.len_utf8();
        }
    }
}
