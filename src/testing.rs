//! In-memory stand-ins for the window tree, the render engine and plugin
//! units. Compiled for tests only.

use std::{
    cell::RefCell,
    collections::{BTreeMap, BTreeSet, HashMap, HashSet},
    fs,
    path::{Path, PathBuf},
    rc::Rc,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use crate::{
    data_loaders::settings::SettingsMap,
    desktop::{
        Rect, Rgb, SurfaceHandle, SurfaceKind, WindowApi, DEFVIEW_CLASS, PROGMAN_CLASS, WORKERW_CLASS,
    },
    error::WallpaperError,
    notify::{Notifier, Severity},
    overlay::OverlaySurface,
    plugins::{PluginContext, PluginFactory, PluginIdentity, WallpaperPlugin, MANIFEST_FILE},
    render::{PlaybackMode, RenderEngine, RenderSurface},
};

/* =========================
   JOURNAL
========================= */

#[derive(Default)]
struct JournalInner {
    entries: Vec<String>,
    behaviors: HashMap<String, ProbeBehavior>,
}

/// Shared, ordered event log the fakes write into so tests can assert on
/// cross-component ordering.
#[derive(Clone, Default)]
pub struct Journal {
    inner: Arc<Mutex<JournalInner>>,
}

impl Journal {
    pub fn push(&self, entry: impl Into<String>) {
        self.lock().entries.push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.lock().entries.clone()
    }

    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut self.lock().entries)
    }

    /// Index of the first entry equal to `entry`, searching from `from`.
    pub fn position_from(&self, from: usize, entry: &str) -> Option<usize> {
        self.lock()
            .entries
            .iter()
            .skip(from)
            .position(|e| e == entry)
            .map(|i| i + from)
    }

    fn behavior(&self, plugin: &str) -> ProbeBehavior {
        self.lock()
            .behaviors
            .get(plugin)
            .copied()
            .unwrap_or(ProbeBehavior::Normal)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, JournalInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/* =========================
   FAKE DESKTOP
========================= */

struct Node {
    class: String,
    parent: Option<SurfaceHandle>,
    bounds: Rect,
    kind: Option<SurfaceKind>,
    text: Option<String>,
    color: Option<Rgb>,
    visible: bool,
}

struct DesktopInner {
    next: isize,
    nodes: BTreeMap<SurfaceHandle, Node>,
    // z-order per parent, index 0 is topmost
    children: HashMap<Option<SurfaceHandle>, Vec<SurfaceHandle>>,
    messages: Vec<(SurfaceHandle, u32)>,
    answer_messages: bool,
    spawn_on_poke: bool,
    failing_reparent: HashSet<SurfaceHandle>,
    failing_kinds: HashSet<SurfaceKind>,
    reparents: usize,
    journal: Option<Journal>,
}

impl Default for DesktopInner {
    fn default() -> Self {
        Self {
            next: 0x100,
            nodes: BTreeMap::new(),
            children: HashMap::new(),
            messages: Vec::new(),
            answer_messages: true,
            spawn_on_poke: false,
            failing_reparent: HashSet::new(),
            failing_kinds: HashSet::new(),
            reparents: 0,
            journal: None,
        }
    }
}

impl DesktopInner {
    fn insert(&mut self, class: &str, parent: Option<SurfaceHandle>, bounds: Rect) -> SurfaceHandle {
        let handle = SurfaceHandle(self.next);
        self.next += 4;
        self.nodes.insert(
            handle,
            Node {
                class: class.to_string(),
                parent,
                bounds,
                kind: None,
                text: None,
                color: None,
                visible: false,
            },
        );
        self.children.entry(parent).or_default().push(handle);
        handle
    }

    fn detach(&mut self, handle: SurfaceHandle) {
        let Some(parent) = self.nodes.get(&handle).map(|n| n.parent) else {
            return;
        };
        if let Some(siblings) = self.children.get_mut(&parent) {
            siblings.retain(|h| *h != handle);
        }
    }

    fn remove_tree(&mut self, handle: SurfaceHandle) {
        for child in self.children.remove(&Some(handle)).unwrap_or_default() {
            self.remove_tree(child);
        }
        self.nodes.remove(&handle);
    }

    fn record(&self, entry: String) {
        if let Some(journal) = &self.journal {
            journal.push(entry);
        }
    }
}

/// Window tree held in memory. Clones share the same tree.
#[derive(Clone, Default)]
pub struct FakeDesktop {
    inner: Rc<RefCell<DesktopInner>>,
}

impl FakeDesktop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Desktop with Progman, the icon-host WorkerW and the wallpaper WorkerW
    /// behind it. Returns the wallpaper WorkerW.
    pub fn install_shell(&self) -> SurfaceHandle {
        self.add_window(PROGMAN_CLASS, None);
        let host = self.add_window(WORKERW_CLASS, None);
        self.add_window(DEFVIEW_CLASS, Some(host));
        self.add_window(WORKERW_CLASS, None)
    }

    pub fn add_window(&self, class: &str, parent: Option<SurfaceHandle>) -> SurfaceHandle {
        self.inner.borrow_mut().insert(class, parent, Rect::default())
    }

    pub fn record_into(&self, journal: &Journal) {
        self.inner.borrow_mut().journal = Some(journal.clone());
    }

    pub fn answer_messages(&self, answer: bool) {
        self.inner.borrow_mut().answer_messages = answer;
    }

    pub fn spawn_worker_on_poke(&self, spawn: bool) {
        self.inner.borrow_mut().spawn_on_poke = spawn;
    }

    pub fn fail_reparent(&self, handle: SurfaceHandle) {
        self.inner.borrow_mut().failing_reparent.insert(handle);
    }

    pub fn fail_reparent_of_kind(&self, kind: SurfaceKind) {
        let mut inner = self.inner.borrow_mut();
        let matching: Vec<_> = inner
            .nodes
            .iter()
            .filter(|(_, n)| n.kind == Some(kind))
            .map(|(h, _)| *h)
            .collect();
        inner.failing_reparent.extend(matching);
        inner.failing_kinds.insert(kind);
    }

    pub fn messages_sent(&self) -> Vec<(SurfaceHandle, u32)> {
        self.inner.borrow().messages.clone()
    }

    pub fn reparent_count(&self) -> usize {
        self.inner.borrow().reparents
    }

    pub fn class_of(&self, handle: SurfaceHandle) -> Option<String> {
        self.inner.borrow().nodes.get(&handle).map(|n| n.class.clone())
    }

    pub fn text_of(&self, handle: SurfaceHandle) -> Option<String> {
        self.inner.borrow().nodes.get(&handle)?.text.clone()
    }

    pub fn color_of(&self, handle: SurfaceHandle) -> Option<Rgb> {
        self.inner.borrow().nodes.get(&handle)?.color
    }

    pub fn bounds_of(&self, handle: SurfaceHandle) -> Option<Rect> {
        self.inner.borrow().nodes.get(&handle).map(|n| n.bounds)
    }

    pub fn is_visible(&self, handle: SurfaceHandle) -> bool {
        self.inner
            .borrow()
            .nodes
            .get(&handle)
            .map(|n| n.visible)
            .unwrap_or(false)
    }

    pub fn children_of(&self, parent: Option<SurfaceHandle>) -> Vec<SurfaceHandle> {
        self.inner
            .borrow()
            .children
            .get(&parent)
            .cloned()
            .unwrap_or_default()
    }

    /// Live surfaces created through [`WindowApi::create_surface`].
    pub fn surfaces_of(&self, kind: SurfaceKind) -> Vec<SurfaceHandle> {
        self.inner
            .borrow()
            .nodes
            .iter()
            .filter(|(_, n)| n.kind == Some(kind))
            .map(|(h, _)| *h)
            .collect()
    }
}

impl WindowApi for FakeDesktop {
    fn find_top_level(&self, class: &str) -> Option<SurfaceHandle> {
        self.find_child(None, None, class)
    }

    fn send_message_timeout(&self, target: SurfaceHandle, message: u32, _timeout: Duration) -> bool {
        let mut inner = self.inner.borrow_mut();
        inner.messages.push((target, message));
        if !inner.answer_messages {
            return false;
        }

        if inner.spawn_on_poke {
            let top = inner.children.get(&None).cloned().unwrap_or_default();
            let host = top.iter().position(|w| {
                inner
                    .children
                    .get(&Some(*w))
                    .map(|kids| kids.iter().any(|k| inner.nodes[k].class == DEFVIEW_CLASS))
                    .unwrap_or(false)
            });
            if let Some(index) = host {
                let has_worker = top[index + 1..]
                    .iter()
                    .any(|w| inner.nodes[w].class == WORKERW_CLASS);
                if !has_worker {
                    let worker = inner.insert(WORKERW_CLASS, None, Rect::default());
                    if let Some(list) = inner.children.get_mut(&None) {
                        list.retain(|h| *h != worker);
                        list.insert(index + 1, worker);
                    }
                }
            }
        }
        true
    }

    fn top_level_windows(&self) -> Vec<SurfaceHandle> {
        self.children_of(None)
    }

    fn find_child(
        &self,
        parent: Option<SurfaceHandle>,
        after: Option<SurfaceHandle>,
        class: &str,
    ) -> Option<SurfaceHandle> {
        let inner = self.inner.borrow();
        let list = inner.children.get(&parent)?;
        let start = match after {
            Some(after) => list.iter().position(|h| *h == after)? + 1,
            None => 0,
        };
        list[start..]
            .iter()
            .copied()
            .find(|h| inner.nodes[h].class == class)
    }

    fn create_surface(&self, kind: SurfaceKind, bounds: Rect) -> Result<SurfaceHandle, String> {
        let mut inner = self.inner.borrow_mut();
        let class = match kind {
            SurfaceKind::Render => "VideoWallpaperRender",
            SurfaceKind::Overlay => "VideoWallpaperOverlay",
        };
        let handle = inner.insert(class, None, bounds);
        if let Some(node) = inner.nodes.get_mut(&handle) {
            node.kind = Some(kind);
        }
        if inner.failing_kinds.contains(&kind) {
            inner.failing_reparent.insert(handle);
        }
        inner.record(format!("desktop:create {class}"));
        Ok(handle)
    }

    fn create_label(
        &self,
        parent: SurfaceHandle,
        text: &str,
        bounds: Rect,
        color: Rgb,
    ) -> Result<SurfaceHandle, String> {
        let mut inner = self.inner.borrow_mut();
        if !inner.nodes.contains_key(&parent) {
            return Err(format!("parent {parent:?} does not exist"));
        }
        let handle = inner.insert("Static", Some(parent), bounds);
        if let Some(node) = inner.nodes.get_mut(&handle) {
            node.text = Some(text.to_string());
            node.color = Some(color);
        }
        Ok(handle)
    }

    fn parent(&self, window: SurfaceHandle) -> Option<SurfaceHandle> {
        self.inner.borrow().nodes.get(&window)?.parent
    }

    fn set_parent(&self, window: SurfaceHandle, parent: Option<SurfaceHandle>) -> Result<(), String> {
        let mut inner = self.inner.borrow_mut();
        if inner.failing_reparent.contains(&window) {
            return Err("access denied".to_string());
        }
        if !inner.nodes.contains_key(&window) {
            return Err(format!("window {window:?} does not exist"));
        }
        if let Some(p) = parent {
            if !inner.nodes.contains_key(&p) {
                return Err(format!("parent {p:?} does not exist"));
            }
        }

        inner.detach(window);
        inner.children.entry(parent).or_default().push(window);
        if let Some(node) = inner.nodes.get_mut(&window) {
            node.parent = parent;
        }
        inner.reparents += 1;
        inner.record(format!("desktop:set_parent {} -> {:?}", window.0, parent.map(|p| p.0)));
        Ok(())
    }

    fn raise_in_place(&self, window: SurfaceHandle) -> Result<(), String> {
        let mut inner = self.inner.borrow_mut();
        let parent = inner
            .nodes
            .get(&window)
            .map(|n| n.parent)
            .ok_or_else(|| format!("window {window:?} does not exist"))?;
        if let Some(list) = inner.children.get_mut(&parent) {
            list.retain(|h| *h != window);
            list.insert(0, window);
        }
        Ok(())
    }

    fn show(&self, window: SurfaceHandle) {
        if let Some(node) = self.inner.borrow_mut().nodes.get_mut(&window) {
            node.visible = true;
        }
    }

    fn destroy(&self, window: SurfaceHandle) -> Result<(), String> {
        let mut inner = self.inner.borrow_mut();
        if !inner.nodes.contains_key(&window) {
            return Err(format!("window {window:?} does not exist"));
        }
        inner.detach(window);
        inner.remove_tree(window);
        inner.record(format!("desktop:destroy {}", window.0));
        Ok(())
    }

    fn exists(&self, window: SurfaceHandle) -> bool {
        self.inner.borrow().nodes.contains_key(&window)
    }

    fn screen_bounds(&self) -> Rect {
        Rect::new(0, 0, 1920, 1080)
    }
}

/* =========================
   FAKE RENDER ENGINE
========================= */

#[derive(Default)]
struct EngineInner {
    next_id: u64,
    outstanding: BTreeSet<u64>,
    attached: HashMap<u64, SurfaceHandle>,
    playing: HashSet<u64>,
    fail_create: bool,
    fail_attach: bool,
    fail_release: bool,
    invalid_releases: usize,
    journal: Option<Journal>,
}

impl EngineInner {
    fn record(&self, entry: String) {
        if let Some(journal) = &self.journal {
            journal.push(entry);
        }
    }
}

/// Counts acquired playback resources. Clones share state.
#[derive(Clone, Default)]
pub struct FakeEngine {
    inner: Rc<RefCell<EngineInner>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_into(&self, journal: &Journal) {
        self.inner.borrow_mut().journal = Some(journal.clone());
    }

    pub fn fail_create(&self, fail: bool) {
        self.inner.borrow_mut().fail_create = fail;
    }

    pub fn fail_attach(&self, fail: bool) {
        self.inner.borrow_mut().fail_attach = fail;
    }

    pub fn fail_release(&self, fail: bool) {
        self.inner.borrow_mut().fail_release = fail;
    }

    pub fn outstanding(&self) -> usize {
        self.inner.borrow().outstanding.len()
    }

    pub fn playing(&self) -> usize {
        self.inner.borrow().playing.len()
    }

    pub fn invalid_releases(&self) -> usize {
        self.inner.borrow().invalid_releases
    }
}

impl RenderEngine for FakeEngine {
    fn create_render_surface(&mut self, video: &Path, mode: PlaybackMode) -> Result<RenderSurface, WallpaperError> {
        let mut inner = self.inner.borrow_mut();
        if inner.fail_create {
            return Err(WallpaperError::RenderEngineInit {
                path: video.to_path_buf(),
                reason: "backend unavailable".to_string(),
            });
        }
        inner.next_id += 1;
        let id = inner.next_id;
        inner.outstanding.insert(id);
        inner.record(format!("engine:create {id}"));
        Ok(RenderSurface::new(id, video.to_path_buf(), mode))
    }

    fn attach_to_native_surface(
        &mut self,
        surface: &RenderSurface,
        window: SurfaceHandle,
        _bounds: Rect,
    ) -> Result<(), WallpaperError> {
        let mut inner = self.inner.borrow_mut();
        if inner.fail_attach {
            return Err(WallpaperError::RenderEngine("attach refused".to_string()));
        }
        inner.attached.insert(surface.id(), window);
        inner.record(format!("engine:attach {}", surface.id()));
        Ok(())
    }

    fn play(&mut self, surface: &RenderSurface) -> Result<(), WallpaperError> {
        let mut inner = self.inner.borrow_mut();
        inner.playing.insert(surface.id());
        inner.record(format!("engine:play {}", surface.id()));
        Ok(())
    }

    fn stop(&mut self, surface: &RenderSurface) -> Result<(), WallpaperError> {
        let mut inner = self.inner.borrow_mut();
        inner.playing.remove(&surface.id());
        inner.record(format!("engine:stop {}", surface.id()));
        Ok(())
    }

    fn release(&mut self, surface: RenderSurface) -> Result<(), WallpaperError> {
        let mut inner = self.inner.borrow_mut();
        let id = surface.id();
        if !inner.outstanding.remove(&id) {
            inner.invalid_releases += 1;
            return Err(WallpaperError::RenderEngine(format!("surface {id} released twice")));
        }
        inner.attached.remove(&id);
        inner.playing.remove(&id);
        inner.record(format!("engine:release {id}"));
        if inner.fail_release {
            return Err(WallpaperError::RenderEngine("release reported an error".to_string()));
        }
        Ok(())
    }
}

/* =========================
   PROBE PLUGINS
========================= */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeBehavior {
    Normal,
    Fail,
    Panic,
}

impl ProbeBehavior {
    pub fn set(journal: &Journal, plugin: &str, behavior: ProbeBehavior) {
        journal.lock().behaviors.insert(plugin.to_string(), behavior);
    }
}

thread_local! {
    static ACTIVE_JOURNAL: RefCell<Journal> = RefCell::new(Journal::default());
}

fn active_journal() -> Journal {
    ACTIVE_JOURNAL.with(|j| j.borrow().clone())
}

/// Plugin that writes every callback it receives into a [`Journal`].
pub struct ProbePlugin {
    name: String,
    journal: Journal,
    fail_initialize: bool,
}

impl ProbePlugin {
    pub fn new(name: &str, journal: Journal) -> Self {
        Self {
            name: name.to_string(),
            journal,
            fail_initialize: false,
        }
    }

    fn enter(&self, entry: String) -> anyhow::Result<()> {
        match self.journal.behavior(&self.name) {
            ProbeBehavior::Normal => {
                self.journal.push(format!("{}:{}", self.name, entry));
                Ok(())
            }
            ProbeBehavior::Fail => anyhow::bail!("{} refused {}", self.name, entry),
            ProbeBehavior::Panic => panic!("{} exploded during {}", self.name, entry),
        }
    }
}

impl WallpaperPlugin for ProbePlugin {
    fn identity(&self) -> PluginIdentity {
        PluginIdentity::new(&self.name, "0.1", "tests", "journal probe")
    }

    fn initialize(&mut self, _ctx: PluginContext) -> anyhow::Result<()> {
        if self.fail_initialize {
            anyhow::bail!("{} cannot initialize", self.name);
        }
        self.enter("initialize".to_string())
    }

    fn on_wallpaper_start(&mut self, video: &Path, looping: bool) -> anyhow::Result<()> {
        self.enter(format!("start {} {}", video.display(), looping))
    }

    fn on_wallpaper_stop(&mut self, _overlay: &OverlaySurface<'_>) -> anyhow::Result<()> {
        self.enter("stop".to_string())
    }

    fn on_settings_changed(
        &mut self,
        settings: &SettingsMap,
        _overlay: Option<&OverlaySurface<'_>>,
    ) -> anyhow::Result<()> {
        let keys: Vec<&str> = settings.keys().map(String::as_str).collect();
        self.enter(format!("settings {}", keys.join(",")))
    }

    fn operate_on_window(&mut self, overlay: &OverlaySurface<'_>) -> anyhow::Result<()> {
        self.enter("operate".to_string())?;
        overlay.add_label(&self.name, Rect::new(0, 0, 100, 20), Rgb::WHITE)?;
        Ok(())
    }

    fn cleanup(&mut self) -> anyhow::Result<()> {
        self.enter("cleanup".to_string())
    }

    fn show_settings_ui(&mut self) -> anyhow::Result<()> {
        self.enter("show_settings".to_string())
    }
}

fn probe(name: &str) -> Box<dyn WallpaperPlugin> {
    Box::new(ProbePlugin::new(name, active_journal()))
}

fn probe_one() -> Box<dyn WallpaperPlugin> {
    probe("one")
}

fn probe_two() -> Box<dyn WallpaperPlugin> {
    probe("two")
}

fn probe_three() -> Box<dyn WallpaperPlugin> {
    probe("three")
}

fn probe_nameless() -> Box<dyn WallpaperPlugin> {
    probe("  ")
}

fn probe_init_fails() -> Box<dyn WallpaperPlugin> {
    let mut plugin = ProbePlugin::new("init-fails", active_journal());
    plugin.fail_initialize = true;
    Box::new(plugin)
}

fn probe_panicking_factory() -> Box<dyn WallpaperPlugin> {
    panic!("factory exploded")
}

/// Factories for the probe plugins, bound to `journal` for the current
/// test thread.
pub fn probe_factories(journal: &Journal) -> Vec<PluginFactory> {
    ACTIVE_JOURNAL.with(|j| *j.borrow_mut() = journal.clone());
    vec![
        PluginFactory { id: "probe-one", create: probe_one },
        PluginFactory { id: "probe-two", create: probe_two },
        PluginFactory { id: "probe-three", create: probe_three },
        PluginFactory { id: "probe-nameless", create: probe_nameless },
        PluginFactory { id: "probe-init-fails", create: probe_init_fails },
        PluginFactory {
            id: "probe-panicking-factory",
            create: probe_panicking_factory,
        },
    ]
}

/// Writes a plugin unit directory whose manifest points at `factory`.
pub fn write_unit(root: &Path, unit: &str, factory: &str) -> PathBuf {
    let dir = root.join(unit);
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join(MANIFEST_FILE),
        serde_json::json!({ "factory": factory }).to_string(),
    )
    .unwrap();
    dir
}

/* =========================
   NOTIFIER
========================= */

#[derive(Default)]
pub struct RecordingNotifier {
    shown: Mutex<Vec<(Severity, String, String)>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<(Severity, String, String)> {
        self.shown.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, severity: Severity, title: &str, message: &str) {
        self.shown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((severity, title.to_string(), message.to_string()));
    }
}
