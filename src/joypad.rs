use serde::{Deserialize, Serialize};

/// Abstract Game Boy button, decoupled from any host input library.
/// Frontends map their own key/gamepad events onto these variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Button {
    Right,
    Left,
    Up,
    Down,
    A,
    B,
    Select,
    Start,
}

/// Represents the state of the Game Boy's buttons.
/// True = pressed, False = released (internal representation)
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct JoypadState {
    pub right: bool,
    pub left: bool,
    pub up: bool,
    pub down: bool,
    pub a: bool,
    pub b: bool,
    pub select: bool,
    pub start: bool,
}

/// Manages Joypad state and interaction with the P1 register.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Joypad {
    state: JoypadState,
    // Store the P1 register's selectable bits (written by the game)
    p1_register_selection: u8, // Bits 4 and 5
}

impl Joypad {
    pub fn new() -> Self {
        Joypad {
            state: JoypadState::default(),
            // P1 defaults to 0xCF (often, depends post-bootrom),
            // means bits 4 and 5 are high (no selection) initially.
            // Store only the writable bits 4,5.
            p1_register_selection: 0x30,
        }
    }

    /// Reads the P1 (Joypad) register based on current state and selection.
    pub fn read_p1(&self) -> u8 {
        let mut joypad_value = 0x0F; // Start with lower nibble high (released)

        if self.p1_register_selection & 0x20 == 0 {
            // Bit 5 Low: Select Action buttons (A, B, Select, Start)
            if self.state.a {
                joypad_value &= 0b1110;
            } // Bit 0 low if pressed
            if self.state.b {
                joypad_value &= 0b1101;
            } // Bit 1 low if pressed
            if self.state.select {
                joypad_value &= 0b1011;
            } // Bit 2 low if pressed
            if self.state.start {
                joypad_value &= 0b0111;
            } // Bit 3 low if pressed
        }
        if self.p1_register_selection & 0x10 == 0 {
            // Bit 4 Low: Select Direction buttons (Right, Left, Up, Down)
            if self.state.right {
                joypad_value &= 0b1110;
            } // Bit 0 low if pressed
            if self.state.left {
                joypad_value &= 0b1101;
            } // Bit 1 low if pressed
            if self.state.up {
                joypad_value &= 0b1011;
            } // Bit 2 low if pressed
            if self.state.down {
                joypad_value &= 0b0111;
            } // Bit 3 low if pressed
        }

        // Combine input bits (0-3) with selection bits (4-5) and unused high bits (reads 1)
        joypad_value | self.p1_register_selection | 0xC0
    }

    /// Writes to the P1 (Joypad) register (only bits 4, 5 are writable).
    pub fn write_p1(&mut self, value: u8) {
        // Only bits 4 and 5 are writable
        self.p1_register_selection = value & 0x30;
    }

    /// Handles a button press. Returns true if a Joypad interrupt should be requested.
    pub fn key_down(&mut self, button: Button) -> bool {
        let (pressed, selection_mask) = match button {
            Button::Right => (&mut self.state.right, 0x10),
            Button::Left => (&mut self.state.left, 0x10),
            Button::Up => (&mut self.state.up, 0x10),
            Button::Down => (&mut self.state.down, 0x10),
            Button::A => (&mut self.state.a, 0x20),
            Button::B => (&mut self.state.b, 0x20),
            Button::Select => (&mut self.state.select, 0x20),
            Button::Start => (&mut self.state.start, 0x20),
        };

        let button_newly_pressed = !*pressed;
        *pressed = true;
        let selection_active = self.p1_register_selection & selection_mask == 0;

        // Request Joypad interrupt only if a button state changed from released->pressed
        // AND that button's group (Directions/Actions) is currently selected by the game.
        button_newly_pressed && selection_active
    }

    /// Handles a button release.
    pub fn key_up(&mut self, button: Button) {
        match button {
            Button::Right => self.state.right = false,
            Button::Left => self.state.left = false,
            Button::Up => self.state.up = false,
            Button::Down => self.state.down = false,
            Button::A => self.state.a = false,
            Button::B => self.state.b = false,
            Button::Select => self.state.select = false,
            Button::Start => self.state.start = false,
        }
    }

    // Optional: Allow external access to raw state if needed elsewhere
    pub fn get_state(&self) -> &JoypadState {
        &self.state
    }
}
