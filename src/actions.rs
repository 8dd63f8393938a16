use anyhow::{Result, anyhow};
use log::{debug, info, warn};

use crate::config::ScreenConfig;
use crate::error::ActuatorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseButton {
    pub fn parse(tok: &str) -> Result<Self> {
        match tok.trim().to_ascii_lowercase().as_str() {
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            "middle" => Ok(Self::Middle),
            other => Err(anyhow!("unknown mouse button: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    Ctrl,
    Alt,
    Shift,
    Super,
}

impl Modifier {
    pub fn parse(tok: &str) -> Result<Self> {
        match tok.trim().to_ascii_uppercase().as_str() {
            "CTRL" | "CONTROL" => Ok(Self::Ctrl),
            "ALT" => Ok(Self::Alt),
            "SHIFT" => Ok(Self::Shift),
            "SUPER" | "META" | "WIN" => Ok(Self::Super),
            other => Err(anyhow!("unsupported modifier key: {other}")),
        }
    }
}

/// Whatever injects pointer and key events into the desktop.
pub trait InputActuator {
    /// Absolute placement in screen pixels.
    fn move_to(&mut self, x: i32, y: i32) -> Result<(), ActuatorError>;
    fn click(&mut self, button: MouseButton) -> Result<(), ActuatorError>;
    /// Vertical wheel; positive scrolls up.
    fn scroll(&mut self, steps: i32) -> Result<(), ActuatorError>;
    fn press_key(&mut self, key: Modifier) -> Result<(), ActuatorError>;
    fn release_key(&mut self, key: Modifier) -> Result<(), ActuatorError>;

    /// Scroll while `key` is held. The key is released even if the scroll fails.
    fn key_modifier_scroll(&mut self, key: Modifier, steps: i32) -> Result<(), ActuatorError> {
        let mut held = ModifierHold::press(self, key)?;
        held.actuator().scroll(steps)
    }
}

/// A pressed modifier that is released when dropped.
pub struct ModifierHold<'a, A: InputActuator + ?Sized> {
    act: &'a mut A,
    key: Modifier,
}

impl<'a, A: InputActuator + ?Sized> ModifierHold<'a, A> {
    pub fn press(act: &'a mut A, key: Modifier) -> Result<Self, ActuatorError> {
        act.press_key(key)?;
        Ok(Self { act, key })
    }

    pub fn actuator(&mut self) -> &mut A {
        self.act
    }
}

impl<A: InputActuator + ?Sized> Drop for ModifierHold<'_, A> {
    fn drop(&mut self) {
        if let Err(e) = self.act.release_key(self.key) {
            warn!("failed to release {:?}: {e}", self.key);
        }
    }
}

/// uinput-backed actuator. Falls back to logging only when no device exists.
pub struct UinputSink {
    width: u32,
    height: u32,
    linux: Option<Box<LinuxUinput>>,
}

impl UinputSink {
    pub fn new(screen: &ScreenConfig) -> Result<Self> {
        #[cfg(target_os = "linux")]
        {
            let dev = LinuxUinput::create(screen)?;
            return Ok(Self {
                width: screen.width,
                height: screen.height,
                linux: Some(Box::new(dev)),
            });
        }
        #[allow(unreachable_code)]
        {
            warn!("uinput not available; running in NO-OP mode");
            Ok(Self::noop(screen))
        }
    }

    pub fn noop(screen: &ScreenConfig) -> Self {
        Self {
            width: screen.width,
            height: screen.height,
            linux: None,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.linux.is_none()
    }

    fn in_bounds(&self, x: i32, y: i32) -> Result<(), ActuatorError> {
        let inside = (0..=self.width as i64).contains(&(x as i64))
            && (0..=self.height as i64).contains(&(y as i64));
        if inside {
            Ok(())
        } else {
            Err(ActuatorError::OutOfBounds {
                x,
                y,
                width: self.width,
                height: self.height,
            })
        }
    }
}

impl InputActuator for UinputSink {
    fn move_to(&mut self, x: i32, y: i32) -> Result<(), ActuatorError> {
        self.in_bounds(x, y)?;
        match self.linux.as_mut() {
            Some(dev) => dev.move_abs(x, y),
            None => {
                debug!("noop: move_to({x}, {y})");
                Ok(())
            }
        }
    }

    fn click(&mut self, button: MouseButton) -> Result<(), ActuatorError> {
        match self.linux.as_mut() {
            Some(dev) => dev.click(button),
            None => {
                debug!("noop: click({button:?})");
                Ok(())
            }
        }
    }

    fn scroll(&mut self, steps: i32) -> Result<(), ActuatorError> {
        match self.linux.as_mut() {
            Some(dev) => dev.scroll_vertical(steps),
            None => {
                debug!("noop: scroll({steps})");
                Ok(())
            }
        }
    }

    fn press_key(&mut self, key: Modifier) -> Result<(), ActuatorError> {
        match self.linux.as_mut() {
            Some(dev) => dev.key_send(key, 1),
            None => {
                debug!("noop: press({key:?})");
                Ok(())
            }
        }
    }

    fn release_key(&mut self, key: Modifier) -> Result<(), ActuatorError> {
        match self.linux.as_mut() {
            Some(dev) => dev.key_send(key, 0),
            None => {
                debug!("noop: release({key:?})");
                Ok(())
            }
        }
    }
}

#[cfg(target_os = "linux")]
fn device_err(e: impl std::fmt::Display) -> ActuatorError {
    ActuatorError::Device(e.to_string())
}

#[cfg(target_os = "linux")]
fn map_key(key: Modifier) -> uinput::event::keyboard::Key {
    use uinput::event::keyboard::Key as K;
    match key {
        Modifier::Ctrl => K::LeftControl,
        Modifier::Alt => K::LeftAlt,
        Modifier::Shift => K::LeftShift,
        Modifier::Super => K::LeftMeta,
    }
}

#[cfg(target_os = "linux")]
struct LinuxUinput {
    dev: uinput::device::Device,
}

#[cfg(not(target_os = "linux"))]
struct LinuxUinput;

#[cfg(not(target_os = "linux"))]
impl LinuxUinput {
    fn move_abs(&mut self, _x: i32, _y: i32) -> Result<(), ActuatorError> {
        Ok(())
    }
    fn click(&mut self, _b: MouseButton) -> Result<(), ActuatorError> {
        Ok(())
    }
    fn scroll_vertical(&mut self, _steps: i32) -> Result<(), ActuatorError> {
        Ok(())
    }
    fn key_send(&mut self, _key: Modifier, _val: i32) -> Result<(), ActuatorError> {
        Ok(())
    }
}

#[cfg(target_os = "linux")]
impl LinuxUinput {
    fn create(screen: &ScreenConfig) -> Result<Self> {
        use uinput::event::{absolute, controller::Mouse, keyboard, relative};

        let dev = uinput::default()?
            .name("Handctl Virtual Pointer")?
            // absolute pointer sized to the screen
            .event(absolute::Position::X)?
            .min(0)
            .max(screen.width as i32)
            .event(absolute::Position::Y)?
            .min(0)
            .max(screen.height as i32)
            .event(relative::Wheel::Vertical)?
            .event(Mouse::Left)?
            .event(Mouse::Right)?
            .event(Mouse::Middle)?
            .event(keyboard::Key::LeftControl)?
            .event(keyboard::Key::LeftAlt)?
            .event(keyboard::Key::LeftShift)?
            .event(keyboard::Key::LeftMeta)?
            .create()?;

        info!(
            "uinput: created virtual pointer {}x{}",
            screen.width, screen.height
        );
        Ok(Self { dev })
    }

    fn sync(&mut self) -> Result<(), ActuatorError> {
        self.dev.synchronize().map_err(device_err)
    }

    fn move_abs(&mut self, x: i32, y: i32) -> Result<(), ActuatorError> {
        use uinput::event::absolute::Position;
        self.dev.send(Position::X, x).map_err(device_err)?;
        self.dev.send(Position::Y, y).map_err(device_err)?;
        self.sync()
    }

    fn key_send(&mut self, key: Modifier, val: i32) -> Result<(), ActuatorError> {
        self.dev.send(map_key(key), val).map_err(device_err)?;
        self.sync()
    }

    fn click(&mut self, button: MouseButton) -> Result<(), ActuatorError> {
        use uinput::event::controller::Mouse;
        let b = match button {
            MouseButton::Left => Mouse::Left,
            MouseButton::Right => Mouse::Right,
            MouseButton::Middle => Mouse::Middle,
        };
        self.dev.send(b, 1).map_err(device_err)?;
        self.sync()?;
        self.dev.send(b, 0).map_err(device_err)?;
        self.sync()
    }

    fn scroll_vertical(&mut self, steps: i32) -> Result<(), ActuatorError> {
        use uinput::event::relative::Wheel;
        self.dev.send(Wheel::Vertical, steps).map_err(device_err)?;
        self.sync()
    }
}
