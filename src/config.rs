use anyhow::{Result, anyhow};
use directories::UserDirs;
use log::{info, warn};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::mpsc::{self, Receiver},
    time::Duration,
};

use crate::actions::{Modifier, MouseButton};
use crate::gestures::Cascade;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Meta {
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GestureConfig {
    pub cascade: Cascade,
    pub pinch_threshold_px: f32,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            cascade: Cascade::Unified,
            pinch_threshold_px: 40.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MotionConfig {
    pub frame_margin_px: f32,
    pub base_smoothing: f32,
    pub deadzone_px: f32,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            frame_margin_px: 100.0,
            base_smoothing: 5.0,
            deadzone_px: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ScreenConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub click_cooldown_ms: u64,
    pub click_button: String,
    pub scroll_steps: i32,
    pub zoom_steps: i32,
    pub zoom_modifier: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            click_cooldown_ms: 200,
            click_button: "left".into(),
            scroll_steps: 30,
            zoom_steps: 20,
            zoom_modifier: "CTRL".into(),
        }
    }
}

impl DispatchConfig {
    pub fn click_cooldown(&self) -> Duration {
        Duration::from_millis(self.click_cooldown_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Read frames on a separate thread and keep only the newest.
    pub latest_frame_only: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            latest_frame_only: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Profile {
    #[serde(default)]
    pub meta: Meta,
    #[serde(default)]
    pub gestures: GestureConfig,
    #[serde(default)]
    pub motion: MotionConfig,
    #[serde(default)]
    pub screen: ScreenConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl Profile {
    pub fn parse(txt: &str) -> Result<Self> {
        let profile: Profile = toml::from_str(txt)?;
        validate_profile(&profile)?;
        Ok(profile)
    }

    pub fn click_button(&self) -> Result<MouseButton> {
        MouseButton::parse(&self.dispatch.click_button)
    }

    pub fn zoom_modifier(&self) -> Result<Modifier> {
        Modifier::parse(&self.dispatch.zoom_modifier)
    }
}

/// Profiles on disk plus the pointer naming the active one.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    pub active_name: String,
    pub profile: Profile,
    pub config_dir: PathBuf,
    pub profiles_dir: PathBuf,
    pub active_ptr: PathBuf,
}

fn default_config_dir() -> Result<PathBuf> {
    let dirs = UserDirs::new().ok_or_else(|| anyhow!("cannot determine home directory"))?;
    Ok(dirs.home_dir().join(".config").join("handctl"))
}

pub fn default_profile_text() -> &'static str {
    include_str!("../profiles/default.toml")
}

impl ConfigStore {
    /// Opens `dir` (or `~/.config/handctl`), installing the default profile and
    /// active pointer on first use.
    pub fn load_or_install_default(dir: Option<PathBuf>) -> Result<Self> {
        let cfgdir = match dir {
            Some(d) => d,
            None => default_config_dir()?,
        };
        let profdir = cfgdir.join("profiles");
        fs::create_dir_all(&profdir)?;

        let def_path = profdir.join("default.toml");
        if !def_path.exists() {
            fs::write(&def_path, default_profile_text())?;
            info!("installed default profile at {}", def_path.display());
        }

        let active_ptr = cfgdir.join("active");
        if !active_ptr.exists() {
            let mut f = fs::File::create(&active_ptr)?;
            f.write_all(b"default")?;
        }

        let active_name = fs::read_to_string(&active_ptr)?.trim().to_string();
        let profile = load_profile(&profdir, &active_name)?;

        Ok(Self {
            active_name,
            profile,
            config_dir: cfgdir,
            profiles_dir: profdir,
            active_ptr,
        })
    }

    pub fn active_path(&self) -> PathBuf {
        self.profiles_dir.join(format!("{}.toml", self.active_name))
    }

    /// Re-reads the active profile. On error the last good profile stays.
    pub fn reload(&mut self) -> Result<()> {
        self.profile = load_profile(&self.profiles_dir, &self.active_name)?;
        Ok(())
    }

    pub fn set_active(&mut self, name: &str) -> Result<()> {
        let p = self.profiles_dir.join(format!("{name}.toml"));
        if !p.exists() {
            return Err(anyhow!("profile not found: {}", p.display()));
        }
        let profile = load_profile(&self.profiles_dir, name)?;
        fs::write(&self.active_ptr, name.as_bytes())?;
        self.active_name = name.to_string();
        self.profile = profile;
        Ok(())
    }

    pub fn list_profiles(&self) -> Vec<String> {
        let mut v = Vec::new();
        if let Ok(rd) = fs::read_dir(&self.profiles_dir) {
            for e in rd.flatten() {
                let path = e.path();
                if path.extension().is_some_and(|ext| ext == "toml") {
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        v.push(stem.to_string());
                    }
                }
            }
        }
        v.sort();
        v
    }

    pub fn doctor_report(&self) -> serde_json::Value {
        let uinput_ok = Path::new("/dev/uinput").exists();
        let in_input_group = check_in_input_group();
        serde_json::json!({
            "uinput_present": uinput_ok,
            "input_group_member": in_input_group,
            "profiles_dir": self.profiles_dir,
            "active_profile": self.active_name,
            "screen": self.profile.screen,
            "hints": {
                "udev_rule": "/etc/udev/rules.d/80-uinput.rules",
                "add_user_to_input_group": "sudo usermod -aG input $USER && newgrp input"
            }
        })
    }
}

/// Watches the profiles directory so edits to the active profile can be
/// picked up by a running loop. Editors often replace the file instead of
/// writing it in place, so the directory is watched, not the file.
pub struct ProfileWatcher {
    _watcher: RecommendedWatcher,
    rx: Receiver<notify::Result<Event>>,
}

impl ProfileWatcher {
    pub fn new(profiles_dir: &Path) -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(tx)?;
        watcher.watch(profiles_dir, RecursiveMode::NonRecursive)?;
        Ok(Self {
            _watcher: watcher,
            rx,
        })
    }

    /// Drains pending events; true if any of them touched `file`.
    pub fn touched(&self, file: &Path) -> bool {
        let mut hit = false;
        while let Ok(res) = self.rx.try_recv() {
            match res {
                Ok(ev) if !ev.kind.is_access() => {
                    hit |= ev.paths.iter().any(|p| p.file_name() == file.file_name());
                }
                Ok(_) => {}
                Err(e) => warn!("profile watch error: {e}"),
            }
        }
        hit
    }
}

fn load_profile(dir: &Path, name: &str) -> Result<Profile> {
    let path = dir.join(format!("{name}.toml"));
    let txt = fs::read_to_string(&path)
        .map_err(|e| anyhow!("failed to read {}: {e}", path.display()))?;
    Profile::parse(&txt).map_err(|e| anyhow!("failed to load {}: {e}", path.display()))
}

fn validate_profile(p: &Profile) -> Result<()> {
    let g = &p.gestures;
    if !(g.pinch_threshold_px.is_finite() && g.pinch_threshold_px > 0.0) {
        return Err(anyhow!("gestures.pinch_threshold_px must be positive"));
    }

    let m = &p.motion;
    if !(m.base_smoothing.is_finite() && m.base_smoothing >= 1.0) {
        return Err(anyhow!("motion.base_smoothing must be at least 1"));
    }
    if !(m.frame_margin_px.is_finite() && m.frame_margin_px >= 0.0) {
        return Err(anyhow!("motion.frame_margin_px must not be negative"));
    }
    if !(m.deadzone_px.is_finite() && m.deadzone_px >= 0.0) {
        return Err(anyhow!("motion.deadzone_px must not be negative"));
    }

    if p.screen.width == 0 || p.screen.height == 0 {
        return Err(anyhow!("screen size must be positive"));
    }

    let d = &p.dispatch;
    if d.scroll_steps < 0 || d.zoom_steps < 0 {
        return Err(anyhow!(
            "dispatch steps are magnitudes; direction comes from the gesture"
        ));
    }
    p.click_button()?;
    p.zoom_modifier()?;
    Ok(())
}

fn check_in_input_group() -> bool {
    if let Ok(s) = fs::read_to_string("/etc/group") {
        let user = whoami::username();
        for line in s.lines() {
            if line.starts_with("input:")
                && line
                    .split(':')
                    .nth(3)
                    .unwrap_or("")
                    .split(',')
                    .any(|u| u == user)
            {
                return true;
            }
        }
    }
    false
}
