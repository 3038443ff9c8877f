//! Input event types consumed by the tree view.
//!
//! The view is toolkit-agnostic: the embedding shell translates its native
//! events into these structs and feeds them to the view's handler methods.
//! Positions are in widget coordinates (header included) unless a handler
//! documents otherwise.

use crate::geom::Point;

/// Keyboard modifiers that may be held during input events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct KeyboardModifiers {
    /// The Shift key is held.
    pub shift: bool,
    /// The Control key is held (Cmd on macOS).
    pub control: bool,
    /// The Alt key is held (Option on macOS).
    pub alt: bool,
}

impl KeyboardModifiers {
    /// No modifiers pressed.
    pub const NONE: Self = Self {
        shift: false,
        control: false,
        alt: false,
    };

    /// Shift modifier only.
    pub const SHIFT: Self = Self {
        shift: true,
        control: false,
        alt: false,
    };

    /// Control modifier only.
    pub const CTRL: Self = Self {
        shift: false,
        control: true,
        alt: false,
    };

    /// Check if any modifier is pressed.
    pub fn any(&self) -> bool {
        self.shift || self.control || self.alt
    }

    /// Check if no modifiers are pressed.
    pub fn none(&self) -> bool {
        !self.any()
    }
}

/// Mouse buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MouseButton {
    /// Primary button (usually left).
    Left = 0,
    /// Secondary button (usually right).
    Right = 1,
    /// Middle button (scroll wheel click).
    Middle = 2,
}

/// Keys the view binds behavior to.
///
/// Printable keys arrive as [`Key::Char`] and feed the type-ahead search;
/// everything the view has no binding for can be skipped by the shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    Space,
    Enter,
    Escape,
    Backspace,
    /// A printable character, already case-folded by the shell if desired.
    Char(char),
}

/// A mouse button press.
#[derive(Debug, Clone, Copy)]
pub struct MousePressEvent {
    pub pos: Point,
    pub button: MouseButton,
    pub modifiers: KeyboardModifiers,
    /// 1 for a single click, 2 for a double click.
    pub click_count: u8,
}

/// Pointer motion, with or without a button held.
#[derive(Debug, Clone, Copy)]
pub struct MouseMoveEvent {
    pub pos: Point,
    pub modifiers: KeyboardModifiers,
}

/// A mouse button release.
#[derive(Debug, Clone, Copy)]
pub struct MouseReleaseEvent {
    pub pos: Point,
    pub button: MouseButton,
    pub modifiers: KeyboardModifiers,
}

/// A key press.
#[derive(Debug, Clone, Copy)]
pub struct KeyPressEvent {
    pub key: Key,
    pub modifiers: KeyboardModifiers,
}
