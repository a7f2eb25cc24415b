use std::cell::{Cell, RefCell};
use std::rc::Rc;

use runroute::{
    Layer, MapBackend, MapHandle, MapScene, RenderConfig, RenderMode, RouteError, RouteView,
    TileStyle, ViewStatus,
};

const LOOP: &str = "_p~iF~ps|U_ulLnnqC~hbEnljB~jiF_||F";
const LINE: &str = "_p~iF~ps|U_ulLnnqC_mqNvxq`@";
// One coordinate only.
const DOT: &str = "_p~iF~ps|U";

#[derive(Clone, Debug, PartialEq)]
enum Event {
    Construct(usize),
    SetTileUrl(usize, String),
    Dispose(usize),
}

#[derive(Default)]
struct Recorder {
    events: RefCell<Vec<Event>>,
    scenes: RefCell<Vec<MapScene>>,
    live: RefCell<Vec<usize>>,
}

impl Recorder {
    fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }

    fn last_scene(&self) -> MapScene {
        self.scenes.borrow().last().cloned().expect("no scene constructed")
    }
}

struct RecordingBackend {
    log: Rc<Recorder>,
    available: Rc<Cell<bool>>,
    fail: bool,
}

struct RecordingHandle {
    id: usize,
    log: Rc<Recorder>,
}

impl MapBackend for RecordingBackend {
    type Handle = RecordingHandle;

    fn is_available(&self) -> bool {
        self.available.get()
    }

    fn construct(&mut self, scene: &MapScene) -> Result<RecordingHandle, RouteError> {
        if self.fail {
            return Err(RouteError::MapBackend("container has no size".into()));
        }
        let id = self.log.scenes.borrow().len();
        assert!(
            self.log.live.borrow().is_empty(),
            "constructed while another surface is live"
        );
        self.log.scenes.borrow_mut().push(scene.clone());
        self.log.live.borrow_mut().push(id);
        self.log.events.borrow_mut().push(Event::Construct(id));
        Ok(RecordingHandle {
            id,
            log: Rc::clone(&self.log),
        })
    }
}

impl MapHandle for RecordingHandle {
    fn set_tile_url(&mut self, url: &str) -> Result<(), RouteError> {
        self.log
            .events
            .borrow_mut()
            .push(Event::SetTileUrl(self.id, url.to_string()));
        Ok(())
    }

    fn dispose(&mut self) {
        self.log.live.borrow_mut().retain(|&id| id != self.id);
        self.log.events.borrow_mut().push(Event::Dispose(self.id));
    }
}

fn view(mode: RenderMode) -> (RouteView<RecordingBackend>, Rc<Recorder>, Rc<Cell<bool>>) {
    let log = Rc::new(Recorder::default());
    let available = Rc::new(Cell::new(true));
    let backend = RecordingBackend {
        log: Rc::clone(&log),
        available: Rc::clone(&available),
        fail: false,
    };
    (
        RouteView::new(backend, mode, RenderConfig::default()),
        log,
        available,
    )
}

#[test]
fn absent_and_degenerate_routes_show_placeholder() {
    let (mut view, log, _) = view(RenderMode::Thumbnail);
    assert_eq!(view.status(), ViewStatus::Detached);
    assert_eq!(view.set_route(None).unwrap(), ViewStatus::Placeholder);
    assert_eq!(view.set_route(Some("")).unwrap(), ViewStatus::Placeholder);
    assert_eq!(view.set_route(Some(DOT)).unwrap(), ViewStatus::Placeholder);
    assert_eq!(view.route().map(|r| r.len()), Some(1));
    assert!(log.events().is_empty());
}

#[test]
fn closed_loop_keeps_start_marker_on_top() {
    let (mut view, log, _) = view(RenderMode::Thumbnail);
    assert_eq!(view.set_route(Some(LOOP)).unwrap(), ViewStatus::Rendered);
    let scene = log.last_scene();
    let start = view.route().unwrap().start().unwrap();
    assert!(matches!(
        scene.topmost_marker_at(start),
        Some(Layer::StartMarker { .. })
    ));
    let kinds: Vec<&str> = scene
        .layers
        .iter()
        .map(|layer| match layer {
            Layer::Path { .. } => "path",
            Layer::FinishMarker { .. } => "finish",
            Layer::StartMarker { .. } => "start",
        })
        .collect();
    assert_eq!(kinds, ["path", "finish", "start"]);
    assert!(!scene.interactions.dragging);
    assert!(!scene.interactions.zoom_control);
}

#[test]
fn new_route_disposes_before_constructing() {
    let (mut view, log, _) = view(RenderMode::Thumbnail);
    view.set_route(Some(LINE)).unwrap();
    view.set_route(Some(LOOP)).unwrap();
    assert_eq!(
        log.events(),
        vec![Event::Construct(0), Event::Dispose(0), Event::Construct(1)]
    );
}

#[test]
fn unchanged_route_is_not_rebuilt() {
    let (mut view, log, _) = view(RenderMode::Thumbnail);
    view.set_route(Some(LINE)).unwrap();
    view.set_route(Some(LINE)).unwrap();
    assert_eq!(log.events(), vec![Event::Construct(0)]);
}

#[test]
fn malformed_route_errors_and_tears_down() {
    let (mut view, log, _) = view(RenderMode::Thumbnail);
    view.set_route(Some(LINE)).unwrap();
    let err = view.set_route(Some("_p~iF~ps|U_")).unwrap_err();
    assert!(err.is_decode_error());
    assert_eq!(view.status(), ViewStatus::Placeholder);
    assert_eq!(log.events(), vec![Event::Construct(0), Event::Dispose(0)]);
}

#[test]
fn repeated_malformed_route_keeps_failing() {
    let (mut view, log, _) = view(RenderMode::Thumbnail);
    for _ in 0..2 {
        let err = view.set_route(Some("_p~iF~ps|U_")).unwrap_err();
        assert!(err.is_decode_error());
        assert_eq!(view.status(), ViewStatus::Placeholder);
    }
    assert!(log.events().is_empty());

    assert_eq!(view.set_route(Some(LINE)).unwrap(), ViewStatus::Rendered);
    assert_eq!(log.events(), vec![Event::Construct(0)]);
}

#[test]
fn unavailable_view_retries_same_route() {
    let (mut view, log, available) = view(RenderMode::Thumbnail);
    available.set(false);
    assert_eq!(view.set_route(Some(LOOP)).unwrap(), ViewStatus::Unavailable);
    assert_eq!(view.refresh().unwrap(), ViewStatus::Unavailable);

    available.set(true);
    assert_eq!(view.set_route(Some(LOOP)).unwrap(), ViewStatus::Rendered);
    assert_eq!(view.set_route(Some(LOOP)).unwrap(), ViewStatus::Rendered);
    assert_eq!(log.events(), vec![Event::Construct(0)]);

    assert_eq!(view.refresh().unwrap(), ViewStatus::Rendered);
    assert_eq!(
        log.events(),
        vec![Event::Construct(0), Event::Dispose(0), Event::Construct(1)]
    );
}

#[test]
fn tile_toggle_swaps_only_the_url() {
    let (mut view, log, _) = view(RenderMode::Modal);
    view.set_route(Some(LOOP)).unwrap();
    let before = view.scene().unwrap().clone();

    assert!(view.toggle_tiles().unwrap());
    assert_eq!(view.tile_style(), TileStyle::Satellite);
    let after = view.scene().unwrap();
    assert_eq!(after.layers, before.layers);
    assert_eq!(after.fit, before.fit);
    assert_eq!(after.tile_url, RenderConfig::default().tiles.satellite);
    assert_eq!(
        log.events(),
        vec![
            Event::Construct(0),
            Event::SetTileUrl(0, RenderConfig::default().tiles.satellite),
        ]
    );
}

#[test]
fn thumbnail_ignores_tile_toggle() {
    let (mut view, log, _) = view(RenderMode::Thumbnail);
    view.set_route(Some(LOOP)).unwrap();
    assert!(!view.toggle_tiles().unwrap());
    assert_eq!(view.tile_style(), TileStyle::Standard);
    assert_eq!(log.events(), vec![Event::Construct(0)]);
}

#[test]
fn mode_change_rebuilds_with_interactions() {
    let (mut view, log, _) = view(RenderMode::Thumbnail);
    view.set_route(Some(LOOP)).unwrap();
    view.set_mode(RenderMode::Modal).unwrap();
    assert_eq!(
        log.events(),
        vec![Event::Construct(0), Event::Dispose(0), Event::Construct(1)]
    );
    let scene = log.last_scene();
    assert!(scene.interactions.dragging && scene.interactions.zoom_control);
    assert_eq!(scene.fit.padding_px, 40);
    assert!(view.state().interactive);
}

#[test]
fn click_expands_thumbnails_only() {
    let clicks = Rc::new(Cell::new(0));
    let counter = Rc::clone(&clicks);
    let (view, _, _) = view(RenderMode::Thumbnail);
    let mut view = view.with_expand(move || counter.set(counter.get() + 1));
    view.set_route(Some(LOOP)).unwrap();
    assert!(view.click());
    view.set_mode(RenderMode::Modal).unwrap();
    assert!(!view.click());
    assert_eq!(clicks.get(), 1);
}

#[test]
fn unavailable_backend_is_not_an_error() {
    let (mut view, log, available) = view(RenderMode::Thumbnail);
    available.set(false);
    assert_eq!(view.set_route(Some(LOOP)).unwrap(), ViewStatus::Unavailable);
    assert!(log.events().is_empty());

    let log = Rc::new(Recorder::default());
    let backend = RecordingBackend {
        log: Rc::clone(&log),
        available: Rc::new(Cell::new(true)),
        fail: true,
    };
    let mut failing = RouteView::new(backend, RenderMode::Modal, RenderConfig::default());
    assert_eq!(failing.set_route(Some(LOOP)).unwrap(), ViewStatus::Unavailable);
}

#[test]
fn unmount_and_drop_dispose() {
    let (mut view, log, _) = view(RenderMode::Thumbnail);
    view.set_route(Some(LOOP)).unwrap();
    view.unmount();
    assert_eq!(view.status(), ViewStatus::Detached);
    assert_eq!(log.events(), vec![Event::Construct(0), Event::Dispose(0)]);

    view.set_route(Some(LINE)).unwrap();
    drop(view);
    assert_eq!(log.events().last(), Some(&Event::Dispose(1)));
    assert!(log.live.borrow().is_empty());
}
