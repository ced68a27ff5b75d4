//! Arena Nav entry point
//!
//! Browser: participant form, keyboard input and the animation-frame loop.
//! Native: a scripted session that steers itself and prints records as
//! JSON lines.

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

#[cfg(target_arch = "wasm32")]
mod wasm_session {
    use std::cell::RefCell;
    use std::rc::Rc;
    use wasm_bindgen::prelude::*;
    use web_sys::{Document, HtmlCanvasElement, HtmlInputElement, KeyboardEvent};

    use arena_nav::ExperimentConfig;
    use arena_nav::audio::{AudioManager, SoundEffect};
    use arena_nav::input::{InputMapper, Key};
    use arena_nav::persistence::{FanOut, HttpSink, InFlight, LocalBackup, RecordSink};
    use arena_nav::renderer::{CanvasRenderer, build_frame, instruction_image};
    use arena_nav::sim::{
        ExperimentPhase, ExperimentState, GameEvent, ParticipantId, TargetTable, Viewport, tick,
    };

    type KeyListener = Closure<dyn FnMut(KeyboardEvent)>;

    /// Delay between checks for pending uploads before redirecting
    const REDIRECT_POLL_MS: i32 = 100;
    /// Checks before redirecting anyway (about 5 s)
    const REDIRECT_MAX_POLLS: u32 = 50;

    /// One running participant session
    struct Session {
        state: ExperimentState,
        input: InputMapper,
        audio: AudioManager,
        sink: FanOut,
        uploads: InFlight,
        renderer: CanvasRenderer,
        viewport: Viewport,
        last_time: f64,
        /// Window listeners, removed when the session ends
        listeners: Vec<(&'static str, KeyListener)>,
        blur_listener: Option<Closure<dyn FnMut(web_sys::Event)>>,
    }

    impl Session {
        fn new(state: ExperimentState, renderer: CanvasRenderer) -> Self {
            let config = state.config().clone();
            let http = HttpSink::new(config.save_endpoint.clone());
            let uploads = http.in_flight();
            let sink = FanOut::new().with(LocalBackup::load()).with(http);
            Self {
                state,
                input: InputMapper::new(),
                audio: AudioManager::new(),
                sink,
                uploads,
                renderer,
                viewport: config.viewport(),
                last_time: 0.0,
                listeners: Vec::new(),
                blur_listener: None,
            }
        }

        fn key_down(&mut self, event: &KeyboardEvent) {
            let Some(key) = Key::from_key_name(&event.key()) else {
                return;
            };
            event.prevent_default();
            // Holding Enter must not skip screens
            if key == Key::Advance && event.repeat() {
                return;
            }
            self.audio.resume();
            let body = *self.state.controlled();
            self.input.press(key, &body);
        }

        fn key_up(&mut self, event: &KeyboardEvent) {
            let Some(key) = Key::from_key_name(&event.key()) else {
                return;
            };
            let body = *self.state.controlled();
            if let Some(hold) = self.input.release(key, &body) {
                log::debug!("{} {:?}", self.state.participant(), hold);
            }
        }

        /// Run one frame. Returns false once the session is over.
        fn frame(&mut self, time: f64) -> bool {
            // Elapsed seconds; the first frame only sets the reference
            let dt = if self.last_time > 0.0 {
                (time - self.last_time) / 1000.0
            } else {
                0.0
            };
            self.last_time = time;

            let input = self.input.take_input();
            match tick(&mut self.state, &input, dt) {
                Ok(events) => self.dispatch(events),
                Err(e) => log::error!("Experiment error: {}", e),
            }
            self.input.track(self.state.controlled());

            let config = self.state.config();
            let cmds = build_frame(
                &self.state.snapshot(),
                &self.viewport,
                config.arena_radius,
                config.target_radius,
                &self.input.feedback(self.state.controlled()),
            );
            self.renderer.draw(&cmds);
            self.update_screens();

            !self.state.is_complete()
        }

        fn dispatch(&mut self, events: Vec<GameEvent>) {
            for event in &events {
                if let Some(effect) = SoundEffect::for_event(event) {
                    self.audio.play(effect);
                }
                match event {
                    GameEvent::Persist(record) => self.sink.submit(record),
                    GameEvent::PhaseEntered(phase) => {
                        // Held keys from the previous screen do not carry over
                        if phase.trial_phase().is_none() {
                            self.input.clear();
                        }
                    }
                    // The player or the marker was reset or swapped
                    GameEvent::TrialStarted { .. }
                    | GameEvent::AnnotationStarted
                    | GameEvent::FeedbackStarted => {
                        self.input.rebase(self.state.controlled());
                    }
                    _ => {}
                }
            }
        }

        /// Toggle the DOM overlays for the current phase
        fn update_screens(&self) {
            let Some(document) = document() else { return };
            let phase = self.state.phase();

            set_visible(&document, "welcome", phase == ExperimentPhase::Welcome);
            set_visible(&document, "complete", phase == ExperimentPhase::Complete);

            if let Some(el) = document.get_element_by_id("instructions") {
                match instruction_image(phase) {
                    Some(src) => {
                        if el.get_attribute("src").as_deref() != Some(src.as_str()) {
                            let _ = el.set_attribute("src", &src);
                        }
                        let _ = el.set_attribute("class", "");
                    }
                    None => {
                        let _ = el.set_attribute("class", "hidden");
                    }
                }
            }
        }

        /// Detach input and leave the page if configured to
        fn finish(&mut self) {
            self.audio.play(SoundEffect::BorderBeepStop);
            if let Some(window) = web_sys::window() {
                for (kind, listener) in self.listeners.drain(..) {
                    let _ = window
                        .remove_event_listener_with_callback(kind, listener.as_ref().unchecked_ref());
                }
                if let Some(blur) = self.blur_listener.take() {
                    let _ = window
                        .remove_event_listener_with_callback("blur", blur.as_ref().unchecked_ref());
                }
            }
            if let Some(url) = self.state.config().completion_url.clone() {
                redirect_when_idle(url, self.uploads.clone(), REDIRECT_MAX_POLLS);
            }
        }
    }

    /// Navigate to `url` once every upload has settled, or after
    /// `polls_left` checks
    fn redirect_when_idle(url: String, uploads: InFlight, polls_left: u32) {
        let Some(window) = web_sys::window() else { return };
        if uploads.is_idle() || polls_left == 0 {
            if !uploads.is_idle() {
                log::warn!("Leaving with {} uploads pending", uploads.count());
            }
            log::info!("Redirecting to {}", url);
            let _ = window.location().set_href(&url);
            return;
        }

        let retry = Closure::once_into_js(move || redirect_when_idle(url, uploads, polls_left - 1));
        if window
            .set_timeout_with_callback_and_timeout_and_arguments_0(
                retry.unchecked_ref(),
                REDIRECT_POLL_MS,
            )
            .is_err()
        {
            log::error!("Could not schedule the completion redirect");
        }
    }

    fn document() -> Option<Document> {
        web_sys::window()?.document()
    }

    fn set_visible(document: &Document, id: &str, visible: bool) {
        if let Some(el) = document.get_element_by_id(id) {
            let _ = el.set_attribute("class", if visible { "" } else { "hidden" });
        }
    }

    fn show_error(document: &Document, message: &str) {
        if let Some(el) = document.get_element_by_id("participant-error") {
            el.set_text_content(Some(message));
            let _ = el.set_attribute("class", "error");
        }
    }

    pub fn run() {
        console_error_panic_hook::set_once();
        console_log::init_with_level(log::Level::Info).expect("Failed to init logger");

        log::info!("Arena Nav starting...");

        let document = document().expect("no document");
        if let Some(loading) = document.get_element_by_id("loading") {
            let _ = loading.set_attribute("class", "hidden");
        }

        let config = ExperimentConfig::load();
        setup_start_button(&document, config);
    }

    /// The participant form: validates the id and starts the session
    fn setup_start_button(page: &Document, config: ExperimentConfig) {
        let Some(btn) = page.get_element_by_id("start-btn") else {
            log::error!("No #start-btn on the page");
            return;
        };
        let started = Rc::new(RefCell::new(false));

        let closure = Closure::<dyn FnMut(_)>::new(move |_event: web_sys::MouseEvent| {
            if *started.borrow() {
                return;
            }
            let Some(document) = document() else { return };
            let raw = document
                .get_element_by_id("participant-id")
                .and_then(|el| el.dyn_into::<HtmlInputElement>().ok())
                .map(|input| input.value())
                .unwrap_or_default();

            let participant = match ParticipantId::parse(&raw) {
                Ok(id) => id,
                Err(e) => {
                    show_error(&document, &e.to_string());
                    return;
                }
            };

            match start_session(&document, participant, config.clone()) {
                Ok(()) => {
                    *started.borrow_mut() = true;
                    set_visible(&document, "participant-form", false);
                }
                Err(e) => {
                    log::error!("Could not start session: {}", e);
                    show_error(&document, &e.to_string());
                }
            }
        });
        let _ = btn.add_event_listener_with_callback("click", closure.as_ref().unchecked_ref());
        closure.forget();
    }

    fn start_session(
        document: &Document,
        participant: ParticipantId,
        config: ExperimentConfig,
    ) -> arena_nav::error::Result<()> {
        let canvas: HtmlCanvasElement = document
            .get_element_by_id("canvas")
            .and_then(|el| el.dyn_into().ok())
            .ok_or_else(|| arena_nav::ExperimentError::InvalidConfig("no canvas".into()))?;
        canvas.set_width(config.viewport_width as u32);
        canvas.set_height(config.viewport_height as u32);
        let renderer = CanvasRenderer::new(&canvas)?;

        let seed = js_sys::Date::now() as u64;
        let state = ExperimentState::new(participant, config, TargetTable::standard(), seed)?;
        log::info!("Session seed: {}", seed);

        let session = Rc::new(RefCell::new(Session::new(state, renderer)));
        setup_input_handlers(session.clone());
        request_animation_frame(session);
        Ok(())
    }

    fn setup_input_handlers(session: Rc<RefCell<Session>>) {
        let Some(window) = web_sys::window() else { return };
        let mut listeners = Vec::new();

        {
            let session = session.clone();
            let closure: KeyListener = Closure::new(move |event: KeyboardEvent| {
                session.borrow_mut().key_down(&event);
            });
            let _ = window
                .add_event_listener_with_callback("keydown", closure.as_ref().unchecked_ref());
            listeners.push(("keydown", closure));
        }

        {
            let session = session.clone();
            let closure: KeyListener = Closure::new(move |event: KeyboardEvent| {
                session.borrow_mut().key_up(&event);
            });
            let _ =
                window.add_event_listener_with_callback("keyup", closure.as_ref().unchecked_ref());
            listeners.push(("keyup", closure));
        }

        // Keyups are lost while the window is unfocused
        let blur = {
            let session = session.clone();
            let closure = Closure::<dyn FnMut(_)>::new(move |_event: web_sys::Event| {
                session.borrow_mut().input.clear();
            });
            let _ =
                window.add_event_listener_with_callback("blur", closure.as_ref().unchecked_ref());
            closure
        };

        let mut s = session.borrow_mut();
        s.listeners = listeners;
        s.blur_listener = Some(blur);
    }

    fn request_animation_frame(session: Rc<RefCell<Session>>) {
        let Some(window) = web_sys::window() else { return };
        let closure = Closure::once(move |time: f64| {
            session_loop(session, time);
        });
        let _ = window.request_animation_frame(closure.as_ref().unchecked_ref());
        closure.forget();
    }

    fn session_loop(session: Rc<RefCell<Session>>, time: f64) {
        let running = session.borrow_mut().frame(time);
        if running {
            request_animation_frame(session);
        } else {
            session.borrow_mut().finish();
            log::info!("Session loop stopped");
        }
    }
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn wasm_main() {
    wasm_session::run();
}

#[cfg(target_arch = "wasm32")]
fn main() {
    // WASM entry point is wasm_main, this is just to satisfy the compiler
}

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    env_logger::init();
    log::info!("Arena Nav (native) starting...");

    if let Err(e) = native::run(std::env::args().skip(1).collect()) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

#[cfg(not(target_arch = "wasm32"))]
mod native {
    use glam::DVec2;

    use arena_nav::error::Result;
    use arena_nav::persistence::{JsonLinesSink, RecordSink};
    use arena_nav::sim::{
        ExperimentState, GameEvent, MoveDirection, ParticipantId, PlayerState, RotateDirection,
        TargetTable, TickInput, TrialPhase, TrialStage, tick,
    };
    use arena_nav::{ExperimentConfig, ExperimentError, direction_to_heading, shortest_angle_delta};

    const FRAME_DT: f64 = 1.0 / 60.0;
    /// Give up after an hour of simulated time
    const MAX_FRAMES: u64 = 60 * 60 * 60;
    /// Heading error (degrees) tolerated before driving
    const AIM_TOLERANCE: f64 = 2.0;

    /// Args: [participant] [seed] [config.json]
    pub fn run(args: Vec<String>) -> Result<()> {
        let participant = ParticipantId::parse(args.first().map(String::as_str).unwrap_or("demo"))?;
        let seed = match args.get(1) {
            Some(raw) => raw
                .parse()
                .map_err(|_| ExperimentError::InvalidConfig(format!("bad seed {raw:?}")))?,
            None => 1,
        };
        let config = match args.get(2) {
            Some(path) => {
                let json = std::fs::read_to_string(path)
                    .map_err(|e| ExperimentError::InvalidConfig(format!("{path}: {e}")))?;
                ExperimentConfig::from_json(&json)?
            }
            None => ExperimentConfig::default(),
        };

        let mut state = ExperimentState::new(participant, config, TargetTable::standard(), seed)?;
        let mut sink = JsonLinesSink::new(std::io::stdout().lock());

        for _ in 0..MAX_FRAMES {
            let input = autopilot(&state);
            for event in tick(&mut state, &input, FRAME_DT)? {
                match event {
                    GameEvent::Persist(record) => sink.submit(&record),
                    other => log::debug!("{:?}", other),
                }
            }
            if state.is_complete() {
                return Ok(());
            }
        }
        Err(ExperimentError::InvalidConfig(
            "autopilot did not finish the session".to_string(),
        ))
    }

    /// Input a participant who knows every target would give
    fn autopilot(state: &ExperimentState) -> TickInput {
        let advance = TickInput {
            advance: true,
            ..TickInput::default()
        };
        let Some(phase) = state.phase().trial_phase() else {
            return advance;
        };
        let targets = state.targets();

        let goal = match state.stage() {
            TrialStage::Feedback => return advance,
            TrialStage::Annotation => targets.goal().map_or(DVec2::ZERO, |t| t.pos),
            TrialStage::Exploration if phase == TrialPhase::Practice => {
                match targets.active().first() {
                    Some(t) => t.pos,
                    None => return advance,
                }
            }
            TrialStage::Exploration => {
                if targets.goal().is_some() {
                    return advance;
                }
                match targets.active().first() {
                    Some(t) => t.pos,
                    None => return advance,
                }
            }
        };

        let radius = state.config().target_radius;
        steer(state.controlled(), goal, radius / 2.0).unwrap_or(advance)
    }

    /// Turn toward `goal`, then drive; `None` once within `arrive`
    fn steer(body: &PlayerState, goal: DVec2, arrive: f64) -> Option<TickInput> {
        if body.pos.distance(goal) <= arrive {
            return None;
        }
        let error = shortest_angle_delta(body.heading, direction_to_heading(body.pos, goal));
        let mut input = TickInput::default();
        if error.abs() > AIM_TOLERANCE {
            input.rotation = Some(if error > 0.0 {
                RotateDirection::Right
            } else {
                RotateDirection::Left
            });
        } else {
            input.movement = Some(MoveDirection::Forward);
        }
        Some(input)
    }
}
