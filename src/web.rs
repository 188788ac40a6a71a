// file: web.rs
// desc: handle web app operations - drawing canvas, kanji candidates, history

use leptos::*;
use std::cell::RefCell;
use std::rc::Rc;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement, MouseEvent};

use crate::AppConfig;
use crate::auth::{Credential, User};
use crate::history::HistoryItem;
use crate::inference::Recognizer;
use crate::model::{BundledClassifier, bundled_readings, load_bundled};
use crate::preprocess::Raster;
use crate::rank::RecognitionResult;
use crate::session::BrowserSession;

const PROMPT: &str = "漢字を書いてください";

thread_local! {
    // set by App, called from the page's Google sign-in callback
    static SIGN_IN_HANDLER: RefCell<Option<Rc<dyn Fn(String)>>> = RefCell::new(None);
}

/// Entry point for the hosting page once Google sign-in produced an ID token.
#[wasm_bindgen]
pub fn sign_in_with_google(id_token: String) {
    let handler = SIGN_IN_HANDLER.with(|h| h.borrow().clone());
    match handler {
        Some(handler) => handler(id_token),
        None => log::warn!("Sign-in requested before the app started"),
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Status {
    message: &'static str,
    class: &'static str,
}

impl Status {
    const fn new(message: &'static str, class: &'static str) -> Self {
        Self { message, class }
    }
}

fn reset_canvas(ctx: &CanvasRenderingContext2d, config: &AppConfig) {
    ctx.set_fill_style_str("#ffffff");
    ctx.fill_rect(0.0, 0.0, config.canvas_size, config.canvas_size);
    ctx.set_stroke_style_str("#000000");
    ctx.set_line_width(config.stroke_width);
    ctx.set_line_cap("round");
    ctx.set_line_join("round");
}

fn stroke_segment(ctx: &CanvasRenderingContext2d, from: (f64, f64), to: (f64, f64)) {
    ctx.begin_path();
    ctx.move_to(from.0, from.1);
    ctx.line_to(to.0, to.1);
    ctx.stroke();
}

fn user_label(user: &User) -> String {
    user.display_name
        .clone()
        .or_else(|| user.email.clone())
        .unwrap_or_else(|| user.id.clone())
}

#[component]
fn DrawingPad(config: AppConfig) -> impl IntoView {
    let canvas_ref = create_node_ref::<leptos::html::Canvas>();
    let (is_drawing, set_is_drawing) = create_signal(false);
    let (last_point, set_last_point) = create_signal::<Option<(f64, f64)>>(None);
    let (results, set_results) = create_signal(Vec::<RecognitionResult>::new());
    let (history, set_history) = create_signal(Vec::<HistoryItem>::new());
    let (user, set_user) = create_signal::<Option<User>>(None);
    let (status, set_status) = create_signal(Status::new("モデルを読み込み中...", ""));
    let (ready, set_ready) = create_signal(false);
    let (busy, set_busy) = create_signal(false);

    let profile = config.recognizer.profile();
    let recognizer = store_value(Rc::new(Recognizer::<BundledClassifier>::new(profile)));
    let session = store_value(Rc::new(BrowserSession::for_browser(&config)));
    let readings = store_value(bundled_readings());

    let canvas_context = create_memo(move |_| {
        canvas_ref.get().and_then(|canvas| {
            let canvas_element = canvas.unchecked_ref::<HtmlCanvasElement>();
            canvas_element
                .get_context("2d")
                .ok()?
                .and_then(|ctx| ctx.dyn_into::<CanvasRenderingContext2d>().ok())
        })
    });

    create_effect(move |_| {
        if let Some(ctx) = canvas_context.get() {
            reset_canvas(&ctx, &config);
        }
    });

    // one-shot model load
    create_effect(move |prev: Option<()>| {
        if prev.is_some() {
            return;
        }
        let recognizer = recognizer.get_value();
        spawn_local(async move {
            match recognizer.load(|| load_bundled(&profile)).await {
                Ok(_) => {
                    set_status.set(Status::new("準備完了", "success"));
                    set_ready.set(true);
                }
                Err(e) => {
                    log::error!("Failed to load model: {e}");
                    set_status.set(Status::new("モデルの読み込みに失敗しました", "error"));
                }
            }
        });
    });

    let subscription = session.with_value(|s| {
        s.auth().on_auth_state_changed(move |u| set_user.set(u.cloned()))
    });
    on_cleanup(move || subscription.unsubscribe());

    // reload history whenever the signed-in user changes; during sign-in the
    // handler below reloads once migration is done
    create_effect(move |_| {
        user.with(|_| ());
        let session = session.get_value();
        if session.is_signing_in() {
            return;
        }
        spawn_local(async move {
            set_history.set(session.history().await);
        });
    });

    SIGN_IN_HANDLER.with(|h| {
        *h.borrow_mut() = Some(Rc::new(move |id_token: String| {
            let session = session.get_value();
            spawn_local(async move {
                match session.sign_in(&Credential::GoogleIdToken(id_token)).await {
                    Ok(_) => set_history.set(session.history().await),
                    // already logged by the auth service
                    Err(_) => set_status.set(Status::new("ログインに失敗しました", "error")),
                }
            });
        }));
    });
    on_cleanup(|| {
        SIGN_IN_HANDLER.with(|h| h.borrow_mut().take());
    });

    let canvas_coords = move |mouse_event: &MouseEvent| -> Option<(f64, f64)> {
        let canvas = canvas_ref.get()?;
        let canvas_element = canvas.unchecked_ref::<HtmlCanvasElement>();
        let rect = canvas_element.get_bounding_client_rect();
        if rect.width() <= 0.0 || rect.height() <= 0.0 {
            return None;
        }

        let scale_x = f64::from(canvas_element.width()) / rect.width();
        let scale_y = f64::from(canvas_element.height()) / rect.height();
        Some((
            (f64::from(mouse_event.client_x()) - rect.left()) * scale_x,
            (f64::from(mouse_event.client_y()) - rect.top()) * scale_y,
        ))
    };

    let on_mouse_down = move |e: MouseEvent| {
        if let (Some(point), Some(ctx)) = (canvas_coords(&e), canvas_context.get_untracked()) {
            set_is_drawing.set(true);
            set_last_point.set(Some(point));
            stroke_segment(&ctx, point, point);
        }
    };

    let on_mouse_move = move |e: MouseEvent| {
        if !is_drawing.get_untracked() {
            return;
        }
        if let (Some(point), Some(from), Some(ctx)) = (
            canvas_coords(&e),
            last_point.get_untracked(),
            canvas_context.get_untracked(),
        ) {
            stroke_segment(&ctx, from, point);
            set_last_point.set(Some(point));
        }
    };

    let stop_drawing = move || {
        set_is_drawing.set(false);
        set_last_point.set(None);
    };

    let recognize = move |_| {
        let Some(ctx) = canvas_context.get_untracked() else {
            return;
        };
        let image = match ctx.get_image_data(0.0, 0.0, config.canvas_size, config.canvas_size) {
            Ok(image) => image,
            Err(e) => {
                log::error!("Failed to read canvas pixels: {:?}", e);
                return;
            }
        };

        set_busy.set(true);
        set_status.set(Status::new("認識中...", ""));

        let pixels = image.data().0;
        let outcome = recognizer.with_value(|recognizer| {
            let raster = Raster::rgba(&pixels, image.width() as usize, image.height() as usize)?;
            recognizer.recognize(&raster, config.top_k)
        });

        match outcome {
            Ok(candidates) if candidates.is_empty() => {
                set_status.set(Status::new(PROMPT, "error"));
                set_results.set(candidates);
            }
            Ok(candidates) => {
                set_status.set(Status::new("", ""));
                set_results.set(candidates);
            }
            Err(e) => {
                log::error!("Recognition error: {e}");
                set_status.set(Status::new("認識エラーが発生しました", "error"));
            }
        }
        set_busy.set(false);
    };

    let clear = move |_| {
        if let Some(ctx) = canvas_context.get_untracked() {
            reset_canvas(&ctx, &config);
        }
        set_results.set(Vec::new());
        set_status.set(Status::new("", ""));
    };

    let save = move |character: char, readings_text: String| {
        let session = session.get_value();
        spawn_local(async move {
            let updated = session.save(HistoryItem::now(character, readings_text)).await;
            set_history.set(updated);
        });
    };

    let remove = move |character: char| {
        let session = session.get_value();
        spawn_local(async move {
            set_history.set(session.remove(character).await);
        });
    };

    let clear_history = move |_| {
        let session = session.get_value();
        spawn_local(async move {
            set_history.set(session.clear().await);
        });
    };

    let sign_out = move |_| {
        let session = session.get_value();
        spawn_local(async move {
            if let Err(e) = session.sign_out().await {
                log::error!("Sign-out failed: {e}");
            }
        });
    };

    let readings_for = move |c: char| {
        readings.with_value(|table| table.get(c).map(|r| r.display_text()).unwrap_or_default())
    };

    view! {
        <div class="account">
            {move || user.get().map(|u| view! {
                <span class="user">{user_label(&u)}</span>
                <button on:click=sign_out>"ログアウト"</button>
            })}
        </div>

        <div class="drawing-container">
            <div class="canvas-container">
                <canvas
                    class="drawing-canvas"
                    _ref=canvas_ref
                    width=config.canvas_size.to_string()
                    height=config.canvas_size.to_string()
                    on:mousedown=on_mouse_down
                    on:mousemove=on_mouse_move
                    on:mouseup=move |_| stop_drawing()
                    on:mouseleave=move |_| stop_drawing()
                />
            </div>

            <div class="controls">
                <button prop:disabled=move || !ready.get() || busy.get() on:click=recognize>"認識"</button>
                <button on:click=clear>"クリア"</button>
            </div>

            <div id="status" class=move || status.get().class>{move || status.get().message}</div>
        </div>

        <div class="results">
            {move || {
                let candidates = results.get();
                if candidates.is_empty() {
                    view! { <div class="no-results">{PROMPT}</div> }.into_view()
                } else {
                    candidates
                        .into_iter()
                        .map(|r| {
                            let character = r.character;
                            let readings_text = readings_for(character);
                            let saved_text = readings_text.clone();
                            view! {
                                <div class="result-item" on:click=move |_| save(character, saved_text.clone())>
                                    <span class="result-character">{character.to_string()}</span>
                                    <div class="result-bar-container">
                                        <div class="result-bar">
                                            <div class="result-bar-fill" style=format!("width: {}%", r.percentage)></div>
                                        </div>
                                        <span class="result-percentage">{format!("{}%", r.percentage)}</span>
                                    </div>
                                    <span class="result-readings">{readings_text}</span>
                                </div>
                            }
                        })
                        .collect_view()
                }
            }}
        </div>

        <div class="history">
            <h2>"履歴"</h2>
            <ul>
                {move || history
                    .get()
                    .into_iter()
                    .map(|item| {
                        let character = item.character;
                        view! {
                            <li class="history-item">
                                <span class="history-character">{character.to_string()}</span>
                                <span class="history-readings">{item.readings}</span>
                                <button on:click=move |_| remove(character)>"×"</button>
                            </li>
                        }
                    })
                    .collect_view()}
            </ul>
            <button on:click=clear_history>"履歴を消去"</button>
        </div>
    }
}

#[component]
pub fn App(config: AppConfig) -> impl IntoView {
    view! {
        <div class="app">
            <h1>"Kanji Doodle"</h1>
            <p>"Draw a kanji and press recognize. Click a candidate to keep it in your history."</p>
            <DrawingPad config=config/>
        </div>
    }
}
