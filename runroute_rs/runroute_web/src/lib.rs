use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use leptos::html::Div;
use leptos::*;
use runroute::{
    parse_activity_feed, ActivityFeed, ActivityRoute, RenderConfig, RenderMode, RouteView,
    TileStyle, ViewStatus,
};
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{Request, RequestInit, Response};

mod leaflet;

pub use leaflet::{LeafletBackend, LeafletHandle};

const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
const APP_COMMIT: &str = env!("GIT_COMMIT_HASH");

type SharedView = Rc<RefCell<Option<RouteView<LeafletBackend>>>>;

const RETRY_INTERVAL: Duration = Duration::from_millis(250);
const RETRY_ATTEMPTS: u32 = 20;

fn log_warn(message: &str) {
    web_sys::console::warn_1(&JsValue::from_str(message));
}

/// Point the view at `encoded`, creating it against `container` on first use.
fn show_route(
    cell: &SharedView,
    container: &web_sys::HtmlElement,
    mode: RenderMode,
    config: &RenderConfig,
    tiles: TileStyle,
    on_expand: Option<Callback<()>>,
    encoded: Option<&str>,
) -> ViewStatus {
    let mut slot = cell.borrow_mut();
    let view = slot.get_or_insert_with(|| {
        let view = RouteView::new(LeafletBackend::new(container.clone()), mode, config.clone());
        match on_expand {
            Some(callback) => view.with_expand(move || callback.call(())),
            None => view,
        }
    });
    if let Err(err) = view.set_tile_style(tiles) {
        log_warn(&format!("tile switch failed: {err}"));
    }
    match view.set_route(encoded) {
        Ok(status) => status,
        Err(err) => {
            log_warn(&format!("route not drawn: {err}"));
            view.status()
        }
    }
}

/// Rebuild a view left unavailable because Leaflet or the container was not
/// ready yet. Gives up after `attempts` tries.
fn retry_unavailable(cell: SharedView, set_status: Option<WriteSignal<ViewStatus>>, attempts: u32) {
    if attempts == 0 {
        return;
    }
    set_timeout(
        move || {
            let status = {
                let Ok(mut slot) = cell.try_borrow_mut() else {
                    return;
                };
                let Some(view) = slot.as_mut() else {
                    return;
                };
                if view.status() != ViewStatus::Unavailable {
                    return;
                }
                match view.refresh() {
                    Ok(status) => status,
                    Err(err) => {
                        log_warn(&format!("route not drawn: {err}"));
                        view.status()
                    }
                }
            };
            if let Some(set_status) = set_status {
                set_status.set(status);
            }
            if status == ViewStatus::Unavailable {
                retry_unavailable(cell, set_status, attempts - 1);
            }
        },
        RETRY_INTERVAL,
    );
}

/// "No route" is for missing or degenerate routes; an unavailable map shows nothing.
fn shows_no_route(status: ViewStatus) -> bool {
    status == ViewStatus::Placeholder
}

fn release(cell: &SharedView) {
    if let Some(mut view) = cell.borrow_mut().take() {
        view.unmount();
    }
}

/// Non-interactive route preview. Clicking it calls `on_expand`.
#[component]
pub fn RouteMap(
    #[prop(into)] polyline: MaybeSignal<Option<String>>,
    #[prop(optional)] on_expand: Option<Callback<()>>,
    #[prop(optional)] config: Option<RenderConfig>,
    #[prop(into, default = "300px".into())] height: String,
) -> impl IntoView {
    let container = create_node_ref::<Div>();
    let cell: SharedView = Rc::new(RefCell::new(None));
    let (status, set_status) = create_signal(ViewStatus::Detached);
    let config = config.unwrap_or_default();

    create_effect({
        let cell = Rc::clone(&cell);
        move |_| {
            let encoded = polyline.get();
            let Some(div) = container.get() else {
                return;
            };
            let status = show_route(
                &cell,
                &div,
                RenderMode::Thumbnail,
                &config,
                TileStyle::Standard,
                on_expand,
                encoded.as_deref(),
            );
            set_status.set(status);
            if status == ViewStatus::Unavailable {
                retry_unavailable(Rc::clone(&cell), Some(set_status), RETRY_ATTEMPTS);
            }
        }
    });

    let on_click = {
        let cell = Rc::clone(&cell);
        move |ev: ev::MouseEvent| {
            let expanded = cell
                .try_borrow_mut()
                .ok()
                .and_then(|mut slot| slot.as_mut().map(|view| view.click()))
                .unwrap_or(false);
            if expanded {
                ev.stop_propagation();
            }
        }
    };

    on_cleanup({
        let cell = Rc::clone(&cell);
        move || release(&cell)
    });

    view! {
        <div
            class="route-map"
            class:expandable=on_expand.is_some()
            style=format!("position:relative;width:100%;height:{height};border-radius:10px;overflow:hidden;background:#e8e0d8;")
            on:click=on_click
        >
            <div node_ref=container style="width:100%;height:100%;"></div>
            <Show when=move || shows_no_route(status.get())>
                <div class="route-map-placeholder">"No route"</div>
            </Show>
        </div>
    }
}

/// Fullscreen interactive map with a Standard/Satellite toggle.
#[component]
pub fn MapModal(
    #[prop(into)] polyline: MaybeSignal<Option<String>>,
    on_close: Callback<()>,
    #[prop(optional)] config: Option<RenderConfig>,
) -> impl IntoView {
    let container = create_node_ref::<Div>();
    let cell: SharedView = Rc::new(RefCell::new(None));
    let (tiles, set_tiles) = create_signal(TileStyle::Standard);
    let config = config.unwrap_or_default();

    create_effect({
        let cell = Rc::clone(&cell);
        move |_| {
            let encoded = polyline.get();
            let Some(div) = container.get() else {
                return;
            };
            let status = show_route(
                &cell,
                &div,
                RenderMode::Modal,
                &config,
                tiles.get_untracked(),
                None,
                encoded.as_deref(),
            );
            if status == ViewStatus::Unavailable {
                retry_unavailable(Rc::clone(&cell), None, RETRY_ATTEMPTS);
            }
        }
    });

    // Swapping tiles keeps the path and markers; only the tile URL changes.
    create_effect({
        let cell = Rc::clone(&cell);
        move |_| {
            let style = tiles.get();
            if let Some(view) = cell.borrow_mut().as_mut() {
                if let Err(err) = view.set_tile_style(style) {
                    log_warn(&format!("tile switch failed: {err}"));
                }
            }
        }
    });

    on_cleanup({
        let cell = Rc::clone(&cell);
        move || release(&cell)
    });

    let tile_button = move |style: TileStyle, label: &'static str| {
        view! {
            <button
                class="tile-toggle"
                class:active=move || tiles.get() == style
                on:click=move |_| set_tiles.set(style)
            >
                {label}
            </button>
        }
    };

    view! {
        <div class="map-modal-backdrop" on:click=move |_| on_close.call(())>
            <div class="map-modal" on:click=|ev: ev::MouseEvent| ev.stop_propagation()>
                <div class="map-modal-bar">
                    <div class="tile-toggles">
                        {tile_button(TileStyle::Standard, "Standard")}
                        {tile_button(TileStyle::Satellite, "Satellite")}
                    </div>
                    <button class="map-modal-close" on:click=move |_| on_close.call(())>"✕"</button>
                </div>
                <div class="map-modal-frame">
                    <div node_ref=container style="width:100%;height:min(80vh,715px);"></div>
                </div>
            </div>
        </div>
    }
}

async fn fetch_feed(url: &str) -> Result<ActivityFeed, String> {
    let window = web_sys::window().ok_or("no window")?;
    let init = RequestInit::new();
    init.set_method("GET");
    let request = Request::new_with_str_and_init(url, &init).map_err(|e| format!("{e:?}"))?;
    let response: Response = JsFuture::from(window.fetch_with_request(&request))
        .await
        .map_err(|e| format!("request failed: {e:?}"))?
        .dyn_into()
        .map_err(|_| "unexpected fetch result".to_string())?;
    let text = JsFuture::from(response.text().map_err(|e| format!("{e:?}"))?)
        .await
        .map_err(|e| format!("{e:?}"))?
        .as_string()
        .unwrap_or_default();
    // Error payloads carry a JSON body too, so parse before checking the status.
    match parse_activity_feed(&text) {
        Ok(feed) => Ok(feed),
        Err(err) if response.ok() => Err(err.to_string()),
        Err(err) => Err(format!("{url} responded with {} ({err})", response.status())),
    }
}

fn activity_card(activity: ActivityRoute, open: WriteSignal<Option<String>>) -> impl IntoView {
    let encoded = activity.encoded_route().map(str::to_owned);
    let expand = encoded.clone();
    let subtitle = match (&activity.start_date_local, &activity.city) {
        (Some(date), Some(city)) => format!("{} · {city}", date.format("%b %-d, %Y")),
        (Some(date), None) => date.format("%b %-d, %Y").to_string(),
        (None, Some(city)) => city.clone(),
        (None, None) => String::new(),
    };
    view! {
        <article class="activity-card">
            <h3>{activity.title.clone()}</h3>
            <p class="note">{subtitle}</p>
            <RouteMap
                polyline=encoded
                on_expand=Callback::new(move |_| {
                    if expand.is_some() {
                        open.set(expand.clone());
                    }
                })
            />
        </article>
    }
}

/// Recent activities with route thumbnails, fetched from `endpoint`.
#[component]
pub fn RouteGallery(
    #[prop(into, default = "/api/activities".into())] endpoint: String,
) -> impl IntoView {
    let (feed, set_feed) = create_signal(Option::<ActivityFeed>::None);
    let (status, set_status) = create_signal(String::from("Loading activities…"));
    let (modal, set_modal) = create_signal(Option::<String>::None);

    spawn_local(async move {
        match fetch_feed(&endpoint).await {
            Ok(loaded) => {
                let routed = loaded.with_routes().count();
                set_status.set(format!(
                    "{} activities, {routed} with a route.",
                    loaded.activities.len()
                ));
                set_feed.set(Some(loaded));
            }
            Err(err) => {
                log_warn(&err);
                set_status.set(format!("Could not load activities: {err}"));
            }
        }
    });

    view! {
        <main class="route-gallery">
            <p class="note">{move || status.get()}</p>
            <section class="activities">
                <For
                    each=move || feed.get().map(|f| f.activities).unwrap_or_default()
                    key=|activity| activity.id
                    children=move |activity| activity_card(activity, set_modal)
                />
            </section>
            {move || {
                modal
                    .get()
                    .map(|polyline| {
                        view! {
                            <MapModal
                                polyline=Some(polyline)
                                on_close=Callback::new(move |_| set_modal.set(None))
                            />
                        }
                    })
            }}
            <footer class="note">{format!("runroute v{APP_VERSION} ({APP_COMMIT})")}</footer>
        </main>
    }
}


#[cfg(target_arch = "wasm32")]
#[wasm_bindgen::prelude::wasm_bindgen(start)]
pub fn start() {
    console_error_panic_hook::set_once();
    leptos::mount_to_body(|| view! { <RouteGallery/> });
}
