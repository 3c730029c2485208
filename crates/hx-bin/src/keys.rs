//! Key translation for the main screen.
//!
//! Every navigation command is issued for both panes; the lock mode held by
//! the context narrows it to one side.

use core_events::{Command, Direction, Side, StepSize, Targets};
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

/// What a key press asks the driver to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Run(Command),
    FindPrompt,
    GotoPrompt,
    Edit,
    Help,
}

fn step(size: StepSize, direction: Direction) -> Action {
    Action::Run(Command::Move {
        size,
        direction,
        targets: Targets::Both,
    })
}

fn repeat_find(direction: Direction) -> Action {
    Action::Run(Command::Find {
        term: None,
        direction,
        targets: Targets::Both,
    })
}

pub fn translate(key: &KeyEvent, two_files: bool) -> Option<Action> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    use Direction::{Backward, Forward};
    let action = match key.code {
        KeyCode::Right => step(StepSize::Byte, Forward),
        KeyCode::Left => step(StepSize::Byte, Backward),
        KeyCode::Down => step(StepSize::Line, Forward),
        KeyCode::Up => step(StepSize::Line, Backward),
        KeyCode::Char(' ') => step(StepSize::Page, Forward),
        KeyCode::Backspace => step(StepSize::Page, Backward),
        KeyCode::End => step(StepSize::All, Forward),
        KeyCode::Home => step(StepSize::All, Backward),
        KeyCode::PageDown => Action::Run(Command::SeekDifferent {
            direction: Forward,
            targets: Targets::Both,
        }),
        KeyCode::PageUp => Action::Run(Command::SeekDifferent {
            direction: Backward,
            targets: Targets::Both,
        }),
        KeyCode::Enter if two_files => Action::Run(Command::NextDifference),
        KeyCode::Enter => Action::Run(Command::SmartScroll),
        KeyCode::Esc => Action::Run(Command::Quit),
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            Action::Run(Command::Quit)
        }
        KeyCode::Char(c) => match c.to_ascii_uppercase() {
            'F' => Action::FindPrompt,
            'N' => repeat_find(Forward),
            'P' => repeat_find(Backward),
            'G' => Action::GotoPrompt,
            'A' => Action::Run(Command::RepeatJump {
                targets: Targets::Both,
            }),
            'J' => Action::Run(Command::JumpBack {
                targets: Targets::Both,
            }),
            '+' | '*' => Action::Run(Command::Skip {
                direction: Forward,
                targets: Targets::Both,
            }),
            '-' => Action::Run(Command::Skip {
                direction: Backward,
                targets: Targets::Both,
            }),
            'T' if two_files => Action::Run(Command::UseOnly(Side::Top)),
            'B' if two_files => Action::Run(Command::UseOnly(Side::Bottom)),
            '#' | '\\' | '=' => Action::Run(Command::PreviousDifference),
            '1' => Action::Run(Command::Sync { follower: Side::Top }),
            '2' => Action::Run(Command::Sync {
                follower: Side::Bottom,
            }),
            'E' => Action::Edit,
            'R' => Action::Run(Command::ToggleRaster),
            'C' => Action::Run(Command::ToggleCaseFold),
            'H' => Action::Help,
            'Q' => Action::Run(Command::Quit),
            _ => return None,
        },
        _ => return None,
    };
    Some(action)
}

pub const HELP: &[&str] = &[
    "Move:   arrows byte/line   space backspace page   home end file",
    "Find:   F find   N next   P previous   pgdn pgup next different byte",
    "Goto:   G goto (dec, 0x hex, N%, +N, -N)   A repeat   J jump back",
    "Skip:   + forward 5%   - back 1%",
    "Diff:   enter next difference   # \\ = previous   1 2 sync views",
    "Views:  T use only top   B use only bottom   R raster   C case folding",
    "Single file: enter smart scroll",
    "Edit:   E edit   tab hex/ascii   ins insert mode   del backspace remove",
    "        enter copies the byte from the other file   esc finish",
    "Quit:   Q or esc",
];

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyEventState;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn enter_depends_on_file_count() {
        let enter = press(KeyCode::Enter);
        assert_eq!(
            translate(&enter, true),
            Some(Action::Run(Command::NextDifference))
        );
        assert_eq!(
            translate(&enter, false),
            Some(Action::Run(Command::SmartScroll))
        );
    }

    #[test]
    fn letters_are_case_insensitive() {
        assert_eq!(translate(&press(KeyCode::Char('f')), true), Some(Action::FindPrompt));
        assert_eq!(translate(&press(KeyCode::Char('F')), true), Some(Action::FindPrompt));
        assert_eq!(
            translate(&press(KeyCode::Char('n')), true),
            Some(repeat_find(Direction::Forward))
        );
    }

    #[test]
    fn lock_keys_need_two_files() {
        assert_eq!(translate(&press(KeyCode::Char('t')), false), None);
        assert_eq!(
            translate(&press(KeyCode::Char('b')), true),
            Some(Action::Run(Command::UseOnly(Side::Bottom)))
        );
    }

    #[test]
    fn releases_are_ignored() {
        let mut key = press(KeyCode::Char('q'));
        key.kind = KeyEventKind::Release;
        key.state = KeyEventState::NONE;
        assert_eq!(translate(&key, true), None);
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(translate(&ctrl_c, true), Some(Action::Run(Command::Quit)));
    }
}
