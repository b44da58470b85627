//! Which clip each avatar plays. Clip names are matched to a small set of
//! kinds once at load; frames only ever deal with [`AnimationKind`].

use log::{info, warn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnimationKind {
    Idle,
    Wave,
    Bow,
    Dance,
}

impl AnimationKind {
    pub const ALL: [AnimationKind; 4] = [
        AnimationKind::Idle,
        AnimationKind::Wave,
        AnimationKind::Bow,
        AnimationKind::Dance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Wave => "wave",
            Self::Bow => "bow",
            Self::Dance => "dance",
        }
    }
}

/// Decides whether a clip name stands for a kind.
pub trait ClipMatcher {
    fn matches(&self, kind: AnimationKind, clip_name: &str) -> bool;
}

/// Case-insensitive substring match against ordered keyword lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordMatcher {
    pub idle: Vec<String>,
    pub wave: Vec<String>,
    pub bow: Vec<String>,
    pub dance: Vec<String>,
}

impl Default for KeywordMatcher {
    fn default() -> Self {
        let words = |w: &[&str]| w.iter().map(|s| s.to_string()).collect();
        Self {
            idle: words(&["idle", "stand", "rest", "default", "walk", "walking"]),
            wave: words(&["wave", "waving", "hand", "hello", "hi"]),
            bow: words(&["bow", "bowing", "bow_down", "respect"]),
            dance: words(&["dance", "dancing"]),
        }
    }
}

impl KeywordMatcher {
    fn keywords(&self, kind: AnimationKind) -> &[String] {
        match kind {
            AnimationKind::Idle => &self.idle,
            AnimationKind::Wave => &self.wave,
            AnimationKind::Bow => &self.bow,
            AnimationKind::Dance => &self.dance,
        }
    }
}

impl ClipMatcher for KeywordMatcher {
    fn matches(&self, kind: AnimationKind, clip_name: &str) -> bool {
        let name = clip_name.to_lowercase();
        self.keywords(kind)
            .iter()
            .any(|k| name.contains(&k.to_lowercase()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedClip {
    pub kind: AnimationKind,
    pub index: usize,
    pub name: String,
}

/// Kind-to-clip table for one model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnimationSet {
    clips: Vec<ResolvedClip>,
}

impl AnimationSet {
    pub fn resolve<S: AsRef<str>>(label: &str, clip_names: &[S], matcher: &dyn ClipMatcher) -> Self {
        let mut clips = Vec::new();
        for kind in AnimationKind::ALL {
            let found = clip_names
                .iter()
                .position(|name| matcher.matches(kind, name.as_ref()));
            match found {
                Some(index) => {
                    let name = clip_names[index].as_ref().to_string();
                    info!("[{label}] {} -> \"{name}\"", kind.as_str());
                    clips.push(ResolvedClip { kind, index, name });
                }
                None => warn!("[{label}] no clip for {}", kind.as_str()),
            }
        }

        if clips.is_empty() {
            if let Some(first) = clip_names.first() {
                let name = first.as_ref().to_string();
                warn!("[{label}] no keyword matched; playing \"{name}\" as idle");
                clips.push(ResolvedClip {
                    kind: AnimationKind::Idle,
                    index: 0,
                    name,
                });
            }
        }
        Self { clips }
    }

    pub fn clip(&self, kind: AnimationKind) -> Option<&ResolvedClip> {
        self.clips.iter().find(|c| c.kind == kind)
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    Wave,
    Bow,
    Dance,
}

impl std::str::FromStr for Preset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "wave" => Ok(Preset::Wave),
            "bow" => Ok(Preset::Bow),
            "dance" => Ok(Preset::Dance),
            other => Err(format!("unknown preset: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerEvent {
    Found,
    Lost,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationConfig {
    pub keywords: KeywordMatcher,
    pub crossfade_s: f32,
    /// Horizontal offset of each avatar from the group center.
    pub spacing: f32,
    pub dance_spacing: f32,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            keywords: KeywordMatcher::default(),
            crossfade_s: 0.3,
            spacing: 0.15,
            dance_spacing: 0.25,
        }
    }
}

#[derive(Debug, Clone)]
struct Playing {
    kind: AnimationKind,
    time_s: f32,
    weight: f32,
}

#[derive(Debug, Clone)]
struct ModelSlot {
    set: AnimationSet,
    current: Option<Playing>,
    fading: Option<Playing>,
    offset_x: f32,
}

/// What one model is showing this frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelAnimation {
    pub kind: Option<AnimationKind>,
    pub clip: Option<String>,
    pub time_s: f32,
    pub weight: f32,
    pub offset_x: f32,
}

/// Playback state for the avatars, advanced with the frame delta.
#[derive(Debug, Clone)]
pub struct AnimationDeck {
    cfg: AnimationConfig,
    models: Vec<ModelSlot>,
}

impl AnimationDeck {
    /// Resolves every model's clips once and starts them on idle.
    pub fn load(cfg: AnimationConfig, clip_lists: &[Vec<String>]) -> Self {
        let n = clip_lists.len();
        let models = clip_lists
            .iter()
            .enumerate()
            .map(|(i, names)| ModelSlot {
                set: AnimationSet::resolve(&format!("model {i}"), names, &cfg.keywords),
                current: None,
                fading: None,
                offset_x: side(i, n) * cfg.spacing,
            })
            .collect();
        let mut deck = Self { cfg, models };
        for i in 0..n {
            deck.play(i, AnimationKind::Idle, false);
        }
        deck
    }

    /// Returns false if the model or its clip for `kind` does not exist.
    pub fn play(&mut self, model: usize, kind: AnimationKind, fade: bool) -> bool {
        let Some(slot) = self.models.get_mut(model) else {
            warn!("invalid model index: {model}");
            return false;
        };
        let Some(clip) = slot.set.clip(kind) else {
            warn!("[model {model}] no {} clip", kind.as_str());
            return false;
        };
        info!("[model {model}] playing {} (\"{}\")", kind.as_str(), clip.name);

        let previous = slot.current.take();
        let crossfade = fade && previous.is_some() && self.cfg.crossfade_s > 0.0;
        slot.fading = if crossfade { previous } else { None };
        slot.current = Some(Playing {
            kind,
            time_s: 0.0,
            weight: if crossfade { 0.0 } else { 1.0 },
        });
        true
    }

    pub fn apply_preset(&mut self, preset: Preset) {
        let (kinds, spacing) = match preset {
            Preset::Wave => ([AnimationKind::Wave, AnimationKind::Wave], self.cfg.spacing),
            Preset::Bow => ([AnimationKind::Bow, AnimationKind::Bow], self.cfg.spacing),
            Preset::Dance => ([AnimationKind::Idle, AnimationKind::Dance], self.cfg.dance_spacing),
        };
        self.play_pair(kinds);
        let n = self.models.len();
        for (i, slot) in self.models.iter_mut().enumerate() {
            slot.offset_x = side(i, n) * spacing;
        }
    }

    pub fn on_marker(&mut self, event: MarkerEvent) {
        match event {
            MarkerEvent::Found => self.play_pair([AnimationKind::Bow, AnimationKind::Bow]),
            MarkerEvent::Lost => self.play_pair([AnimationKind::Idle, AnimationKind::Idle]),
        }
    }

    fn play_pair(&mut self, kinds: [AnimationKind; 2]) {
        for i in 0..self.models.len() {
            self.play(i, kinds[i.min(1)], true);
        }
    }

    pub fn advance(&mut self, dt: f32) {
        let step = if self.cfg.crossfade_s > 0.0 {
            dt / self.cfg.crossfade_s
        } else {
            1.0
        };
        for slot in &mut self.models {
            if let Some(cur) = slot.current.as_mut() {
                cur.time_s += dt;
                cur.weight = (cur.weight + step).min(1.0);
            }
            if let Some(old) = slot.fading.as_mut() {
                old.time_s += dt;
                old.weight -= step;
                if old.weight <= 0.0 {
                    slot.fading = None;
                }
            }
        }
    }

    pub fn snapshot(&self) -> Vec<ModelAnimation> {
        self.models
            .iter()
            .map(|slot| {
                let cur = slot.current.as_ref();
                ModelAnimation {
                    kind: cur.map(|c| c.kind),
                    clip: cur
                        .and_then(|c| slot.set.clip(c.kind))
                        .map(|c| c.name.clone()),
                    time_s: cur.map_or(0.0, |c| c.time_s),
                    weight: cur.map_or(0.0, |c| c.weight),
                    offset_x: slot.offset_x,
                }
            })
            .collect()
    }
}

/// -1 for the left model, +1 for the right one, 0 when alone.
fn side(index: usize, count: usize) -> f32 {
    match (count, index) {
        (0 | 1, _) => 0.0,
        (_, 0) => -1.0,
        _ => 1.0,
    }
}
