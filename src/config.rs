use anyhow::{Context, Result, anyhow};
use directories::UserDirs;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use crate::animation::{AnimationConfig, AnimationKind, AnimationSet};
use crate::geometry::{DepthModel, LayoutConfig, ModelBounds, Viewport};
use crate::gestures::GestureThresholds;
use crate::integrator::{ReturnCurve, ThrowConfig};
use crate::interaction::{InteractionConfig, ReturnConfig, Tuning};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Meta {
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GestureSection {
    #[serde(flatten)]
    pub thresholds: GestureThresholds,
    #[serde(default)]
    pub depth: DepthModel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSection {
    pub fov_y_deg: f32,
    pub viewport: Viewport,
}

impl Default for CameraSection {
    fn default() -> Self {
        Self {
            fov_y_deg: 75.0,
            viewport: Viewport::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SceneModel {
    #[serde(default)]
    pub clips: Vec<String>,
}

/// The avatar group as the renderer loaded it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneSection {
    /// Height of the group at scale 1.
    pub size_y: f32,
    pub center_y: f32,
    pub models: Vec<SceneModel>,
}

impl Default for SceneSection {
    fn default() -> Self {
        Self {
            size_y: 0.5,
            center_y: 0.25,
            models: Vec::new(),
        }
    }
}

impl SceneSection {
    pub fn bounds(&self) -> ModelBounds {
        ModelBounds::from_extents(self.size_y, self.center_y)
    }

    pub fn clip_lists(&self) -> Vec<Vec<String>> {
        self.models.iter().map(|m| m.clips.clone()).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub meta: Meta,
    #[serde(default)]
    pub gesture: GestureSection,
    #[serde(default)]
    pub interaction: InteractionConfig,
    #[serde(default)]
    pub returning: ReturnConfig,
    #[serde(default)]
    pub throw: ThrowConfig,
    #[serde(default)]
    pub camera: CameraSection,
    #[serde(default)]
    pub layout: LayoutConfig,
    #[serde(default)]
    pub scene: SceneSection,
    #[serde(default)]
    pub animation: AnimationConfig,
}

impl Profile {
    pub fn display_name(&self) -> &str {
        self.meta.name.as_deref().unwrap_or("unnamed")
    }

    pub fn to_tuning(&self) -> Tuning {
        Tuning {
            interaction: self.interaction.clone(),
            returning: self.returning.clone(),
            throw: self.throw.clone(),
            depth: self.gesture.depth,
        }
    }
}

/// Parses and validates a profile; `origin` only labels errors.
pub fn parse_profile(text: &str, origin: &str) -> Result<Profile> {
    let profile: Profile =
        toml::from_str(text).map_err(|e| anyhow!("failed to parse {origin}: {e}"))?;
    validate_profile(&profile).with_context(|| format!("invalid profile {origin}"))?;
    Ok(profile)
}

#[derive(Debug, Clone)]
pub struct ProfileStore {
    pub active_name: String,
    pub profile: Profile,
    pub config_dir: PathBuf,
    pub profiles_dir: PathBuf,
    pub active_ptr: PathBuf,
}

fn config_dir() -> Result<PathBuf> {
    let dirs = UserDirs::new().ok_or_else(|| anyhow!("could not determine home directory"))?;
    Ok(dirs.home_dir().join(".config").join("pinchgrab"))
}

fn default_profile_text() -> &'static str {
    include_str!("../profiles/default.toml")
}

impl ProfileStore {
    pub fn load_or_install_default() -> Result<Self> {
        Self::open_at(config_dir()?)
    }

    /// Same as [`load_or_install_default`](Self::load_or_install_default)
    /// rooted at an explicit directory.
    pub fn open_at(cfgdir: PathBuf) -> Result<Self> {
        let profdir = cfgdir.join("profiles");
        fs::create_dir_all(&profdir)
            .with_context(|| format!("failed to create {}", profdir.display()))?;

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
        self.profile_path(&self.active_name)
    }

    pub fn profile_path(&self, name: &str) -> PathBuf {
        self.profiles_dir.join(format!("{name}.toml"))
    }

    /// Re-reads the active profile. On error the last good profile stays.
    pub fn reload(&mut self) -> Result<()> {
        self.profile = load_profile(&self.profiles_dir, &self.active_name)?;
        Ok(())
    }

    pub fn set_active(&mut self, name: &str) -> Result<()> {
        let p = self.profile_path(name);
        if !p.exists() {
            return Err(anyhow!("profile not found: {}", p.display()));
        }
        let profile = load_profile(&self.profiles_dir, name)?;
        fs::write(&self.active_ptr, name.as_bytes())?;
        self.active_name = name.to_string();
        self.profile = profile;
        Ok(())
    }

    /// Loads a profile by name without touching the active pointer.
    pub fn load_named(&self, name: &str) -> Result<Profile> {
        load_profile(&self.profiles_dir, name)
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
        let profiles: Vec<serde_json::Value> = self
            .list_profiles()
            .into_iter()
            .map(|name| match self.load_named(&name) {
                Ok(_) => serde_json::json!({"name": name, "ok": true}),
                Err(e) => serde_json::json!({"name": name, "ok": false, "error": format!("{e:#}")}),
            })
            .collect();

        let models: Vec<serde_json::Value> = self
            .profile
            .scene
            .models
            .iter()
            .enumerate()
            .map(|(i, m)| {
                let set = AnimationSet::resolve(
                    &format!("model {i}"),
                    &m.clips,
                    &self.profile.animation.keywords,
                );
                let missing: Vec<&str> = AnimationKind::ALL
                    .iter()
                    .filter(|k| set.clip(**k).is_none())
                    .map(|k| k.as_str())
                    .collect();
                serde_json::json!({"index": i, "clips": m.clips.len(), "missing": missing})
            })
            .collect();

        let mut hints = Vec::new();
        if !self.profile.throw.enabled {
            hints.push("throw is disabled; set [throw] enabled = true to fling the avatars");
        }
        if self.profile.scene.models.is_empty() {
            hints.push("no [[scene.models]] listed; animations stay off");
        }

        serde_json::json!({
            "config_dir": self.config_dir,
            "profiles_dir": self.profiles_dir,
            "active_profile": self.active_name,
            "active_path_present": self.active_path().exists(),
            "profiles": profiles,
            "models": models,
            "hints": hints,
        })
    }
}

fn load_profile(profiles_dir: &Path, name: &str) -> Result<Profile> {
    let path = profiles_dir.join(format!("{name}.toml"));
    let txt = fs::read_to_string(&path)
        .map_err(|e| anyhow!("failed to read {}: {e}", path.display()))?;
    let profile = parse_profile(&txt, &path.display().to_string())?;
    if profile.meta.name.as_deref().is_some_and(|n| n != name) {
        warn!(
            "profile file '{name}' declares meta.name = '{}'",
            profile.display_name()
        );
    }
    Ok(profile)
}

fn validate_profile(p: &Profile) -> Result<()> {
    let g = &p.gesture.thresholds;
    if g.pinch_threshold <= 0.0 {
        return Err(anyhow!("gesture.pinch_threshold must be positive"));
    }
    if !(0.0 < g.min_hand_size && g.min_hand_size < g.max_hand_size) {
        return Err(anyhow!(
            "gesture hand size bounds must satisfy 0 < min_hand_size < max_hand_size"
        ));
    }
    if !(0.0..0.5).contains(&g.edge_margin) {
        return Err(anyhow!("gesture.edge_margin must be in [0,0.5) normalized units"));
    }

    let i = &p.interaction;
    if i.pinch_cooldown_ms < 0.0 || i.return_delay_ms < 0.0 {
        return Err(anyhow!("interaction durations must not be negative"));
    }
    if !(0.0 < i.scale_min && i.scale_min <= i.scale_max) {
        return Err(anyhow!("interaction scale clamp must satisfy 0 < scale_min <= scale_max"));
    }
    if i.min_hand_distance <= 0.0 {
        return Err(anyhow!("interaction.min_hand_distance must be positive"));
    }

    let rate_ok = |r: f32| r > 0.0 && r <= 1.0;
    match p.returning.curve {
        ReturnCurve::Constant { rate } if !rate_ok(rate) => {
            return Err(anyhow!("returning.curve.rate must be in (0,1]"));
        }
        ReturnCurve::TwoPhase {
            fast_rate,
            decay,
            period_ms,
        } if !rate_ok(fast_rate) || !rate_ok(fast_rate - decay) || period_ms < 0.0 => {
            return Err(anyhow!(
                "returning.curve rates must stay in (0,1] and period_ms must not be negative"
            ));
        }
        _ => {}
    }
    if p.returning.epsilon <= 0.0 {
        return Err(anyhow!("returning.epsilon must be positive"));
    }

    let t = &p.throw;
    if t.velocity_threshold < 0.0 || t.velocity_scale <= 0.0 {
        return Err(anyhow!("throw.velocity_threshold/velocity_scale out of range"));
    }
    if !(0.0..=1.0).contains(&t.restitution) {
        return Err(anyhow!("throw.restitution must be in [0,1]"));
    }
    if t.far_z >= t.near_z {
        return Err(anyhow!("throw.far_z must lie beyond throw.near_z"));
    }

    if !(1.0..179.0).contains(&p.camera.fov_y_deg) {
        return Err(anyhow!("camera.fov_y_deg must be in [1,179)"));
    }
    if p.camera.viewport.width <= 0.0 || p.camera.viewport.height <= 0.0 {
        return Err(anyhow!("camera.viewport must have a positive size"));
    }

    let l = &p.layout;
    if l.target_screen_ratio <= 0.0
        || l.min_distance <= 0.0
        || l.min_distance > l.max_distance
        || l.min_scale <= 0.0
        || l.min_scale > l.max_scale
    {
        return Err(anyhow!("layout ratios and clamps must be positive and ordered"));
    }

    if p.scene.size_y <= 0.0 {
        return Err(anyhow!("scene.size_y must be positive"));
    }
    if p.animation.crossfade_s < 0.0 {
        return Err(anyhow!("animation.crossfade_s must not be negative"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interaction::GrabModel;
    use crate::landmarks::Joint;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("pinchgrab-{tag}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn default_profile_parses() {
        let p = parse_profile(default_profile_text(), "default.toml").unwrap();
        assert_eq!(p.display_name(), "default");
        assert_eq!(p.gesture.thresholds.pinch_threshold, 0.08);
        assert_eq!(p.interaction.pinch_cooldown_ms, 1000.0);
        assert_eq!(p.interaction.return_delay_ms, 2000.0);
        assert_eq!(
            p.interaction.grab,
            GrabModel::Fingertip {
                anchor: Joint::ThumbTip,
                scale: Default::default()
            }
        );
        assert_eq!(p.scene.models.len(), 2);
        assert_eq!(p.to_tuning().depth, DepthModel::default());
    }

    #[test]
    fn minimal_profile_uses_defaults() {
        let p = parse_profile("[meta]\nname = \"tiny\"\n", "tiny").unwrap();
        assert_eq!(p.gesture.thresholds, GestureThresholds::default());
        assert_eq!(p.camera.fov_y_deg, 75.0);
        assert!(!p.throw.enabled);
        assert_eq!(p.returning.curve, ReturnCurve::default());
    }

    #[test]
    fn nested_sections_parse() {
        let txt = r#"
            [meta]
            name = "custom"
            [gesture]
            pinch_threshold = 0.06
            [gesture.depth]
            base = 1.0
            [interaction.grab]
            kind = "offset"
            anchor = "middle_mcp"
            [returning.curve]
            kind = "constant"
            rate = 0.1
            [throw]
            enabled = true
        "#;
        let p = parse_profile(txt, "custom").unwrap();
        assert_eq!(p.gesture.thresholds.pinch_threshold, 0.06);
        assert_eq!(p.gesture.depth.base, 1.0);
        assert_eq!(p.gesture.depth.z_gain, 0.4);
        assert_eq!(p.interaction.grab, GrabModel::Offset { anchor: Joint::MiddleMcp });
        assert_eq!(p.returning.curve, ReturnCurve::Constant { rate: 0.1 });
        assert!(p.throw.enabled);
    }

    #[test]
    fn bad_values_are_rejected() {
        let cases = [
            "[gesture]\nmin_hand_size = 0.5\nmax_hand_size = 0.4",
            "[returning.curve]\nkind = \"constant\"\nrate = 1.5",
            "[throw]\nrestitution = 2.0",
            "[camera]\nfov_y_deg = 0.0",
            "[layout]\nmin_scale = 2.0",
        ];
        for body in cases {
            let txt = format!("[meta]\nname = \"bad\"\n{body}\n");
            assert!(parse_profile(&txt, "bad").is_err(), "accepted: {body}");
        }
    }

    #[test]
    fn store_installs_default_and_switches() {
        let dir = scratch_dir("store");
        let mut store = ProfileStore::open_at(dir.clone()).unwrap();
        assert_eq!(store.active_name, "default");
        assert_eq!(store.list_profiles(), vec!["default".to_string()]);
        assert!(store.set_active("missing").is_err());

        fs::write(
            store.profile_path("fast"),
            "[meta]\nname = \"fast\"\n[throw]\nenabled = true\n",
        )
        .unwrap();
        store.set_active("fast").unwrap();
        assert!(store.profile.throw.enabled);
        assert_eq!(fs::read_to_string(&store.active_ptr).unwrap(), "fast");

        // a broken edit keeps the last good profile
        fs::write(store.profile_path("fast"), "[meta\n").unwrap();
        assert!(store.reload().is_err());
        assert!(store.profile.throw.enabled);

        let report = store.doctor_report();
        assert_eq!(report["active_profile"], "fast");
        assert_eq!(report["profiles"].as_array().unwrap().len(), 2);
        let _ = fs::remove_dir_all(dir);
    }
}
