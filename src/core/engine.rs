//! The playback state machine.
//!
//! The engine owns the current position in a [`ScriptGraph`], drives the
//! typewriter and auto-advance from host `tick` calls, and turns player
//! intents into node changes. It never blocks and never reads the clock:
//! asset loads are polled without waiting, and every delay is a [`Timer`]
//! advanced by `tick`.

use futures::future::{BoxFuture, FutureExt};
use futures::stream::{FuturesUnordered, StreamExt};
use futures::task::noop_waker;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::cache::{AssetCache, AssetLoader, CacheError, ResolveOutcome};
use crate::core::config::EngineConfig;
use crate::core::events::{EngineEvent, EventBus, Intent, Subscription};
use crate::core::graph::ScriptGraph;
use crate::core::history::HistoryLog;
use crate::core::journey::{JourneyError, JourneyRecorder};
use crate::core::markup::{MarkupError, Typewriter};
use crate::core::snapshot::{Snapshot, SnapshotCodec, SnapshotError};
use crate::core::store::{SnapshotStore, StoreError};
use crate::core::timer::Timer;
use crate::schema::node::{is_terminal_id, DialogueNode, Directive, Slot};
use crate::schema::state::PlaybackState;
use crate::schema::value::MetaValue;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown node '{0}'")]
    UnknownNode(String),
    #[error("node '{node}' has no option '{option}'")]
    InvalidChoice { node: String, option: String },
    #[error("choices are only accepted while interacting (state is {0:?})")]
    NotInteracting(PlaybackState),
    #[error("playback has not started")]
    NotStarted,
    #[error("playback has already started")]
    AlreadyStarted,
    #[error("engine has been disposed")]
    Disposed,
    #[error("engine was built without a snapshot store")]
    NoStore,
    #[error("save slot {0} is empty")]
    EmptySlot(usize),
    #[error("engine builder is missing its {0}")]
    MissingComponent(&'static str),
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// A finished slot request, carried back to the engine for reporting.
struct StageReport<R> {
    slot: Slot,
    name: Option<String>,
    result: Result<ResolveOutcome<R>, CacheError>,
}

/// Visual-novel playback over one chapter. Built via
/// [`PlaybackEngine::builder()`].
pub struct PlaybackEngine<L: AssetLoader> {
    graph: ScriptGraph,
    cache: Arc<AssetCache<L>>,
    store: Option<Box<dyn SnapshotStore>>,
    config: EngineConfig,
    entry: String,

    state: PlaybackState,
    previous_state: PlaybackState,
    current: Option<String>,
    popup_open: bool,
    /// State to go back to when the popup closes.
    popup_return: PlaybackState,
    chapter_finished: bool,
    disposed: bool,

    journey: JourneyRecorder,
    history: HistoryLog,

    typewriter: Option<Typewriter>,
    displayed_text: String,
    auto_play: bool,
    auto_timer: Option<Timer>,

    intents: VecDeque<Intent>,
    processing: bool,
    events: EventBus,
    loads: FuturesUnordered<BoxFuture<'static, StageReport<L::Resource>>>,
}

pub struct PlaybackEngineBuilder<L: AssetLoader> {
    config: EngineConfig,
    graph: Option<ScriptGraph>,
    cache: Option<Arc<AssetCache<L>>>,
    store: Option<Box<dyn SnapshotStore>>,
    entry: Option<String>,
}

impl<L: AssetLoader> PlaybackEngineBuilder<L> {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn graph(mut self, graph: ScriptGraph) -> Self {
        self.graph = Some(graph);
        self
    }

    pub fn cache(mut self, cache: AssetCache<L>) -> Self {
        self.cache = Some(Arc::new(cache));
        self
    }

    pub fn store(mut self, store: impl SnapshotStore + 'static) -> Self {
        self.store = Some(Box::new(store));
        self
    }

    /// Node `start` plays. Defaults to the chapter's first node.
    pub fn entry(mut self, node_id: &str) -> Self {
        self.entry = Some(node_id.to_string());
        self
    }

    pub fn build(self) -> Result<PlaybackEngine<L>, EngineError> {
        let graph = self.graph.ok_or(EngineError::MissingComponent("graph"))?;
        let cache = self.cache.ok_or(EngineError::MissingComponent("cache"))?;
        let entry = self.entry.unwrap_or_else(|| graph.entry().to_string());
        if !graph.contains(&entry) {
            return Err(EngineError::UnknownNode(entry));
        }

        info!(
            chapter_id = %graph.chapter_id(),
            nodes = graph.len(),
            entry = %entry,
            "playback_engine_created"
        );

        Ok(PlaybackEngine {
            history: HistoryLog::new(self.config.history_capacity),
            graph,
            cache,
            store: self.store,
            config: self.config,
            entry,
            state: PlaybackState::Init,
            previous_state: PlaybackState::Init,
            current: None,
            popup_open: false,
            popup_return: PlaybackState::Init,
            chapter_finished: false,
            disposed: false,
            journey: JourneyRecorder::new(),
            typewriter: None,
            displayed_text: String::new(),
            auto_play: false,
            auto_timer: None,
            intents: VecDeque::new(),
            processing: false,
            events: EventBus::new(),
            loads: FuturesUnordered::new(),
        })
    }
}

impl<L: AssetLoader> PlaybackEngine<L> {
    pub fn builder() -> PlaybackEngineBuilder<L> {
        PlaybackEngineBuilder {
            config: EngineConfig::default(),
            graph: None,
            cache: None,
            store: None,
            entry: None,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn previous_state(&self) -> PlaybackState {
        self.previous_state
    }

    pub fn current_node_id(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn current_node(&self) -> Option<&DialogueNode> {
        self.current.as_deref().and_then(|id| self.graph.node(id))
    }

    /// Text as the player currently sees it, markup included.
    pub fn displayed_text(&self) -> &str {
        &self.displayed_text
    }

    pub fn journey(&self) -> &JourneyRecorder {
        &self.journey
    }

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    pub fn graph(&self) -> &ScriptGraph {
        &self.graph
    }

    pub fn cache(&self) -> &Arc<AssetCache<L>> {
        &self.cache
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_auto_play(&self) -> bool {
        self.auto_play
    }

    /// True while an auto-advance is counting down.
    pub fn is_auto_advance_scheduled(&self) -> bool {
        self.auto_timer.is_some()
    }

    pub fn is_popup_open(&self) -> bool {
        self.popup_open
    }

    pub fn is_chapter_finished(&self) -> bool {
        self.chapter_finished
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Slot requests still waiting on a load.
    pub fn pending_loads(&self) -> usize {
        self.loads.len()
    }

    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: FnMut(&EngineEvent, &mut Vec<Intent>) + Send + 'static,
    {
        self.events.subscribe(handler)
    }

    /// Play the entry node.
    pub fn start(&mut self) -> Result<(), EngineError> {
        let entry = self.entry.clone();
        self.start_at(&entry)
    }

    pub fn start_at(&mut self, node_id: &str) -> Result<(), EngineError> {
        self.ensure_live()?;
        if self.state != PlaybackState::Init {
            return Err(EngineError::AlreadyStarted);
        }
        if !self.graph.contains(node_id) {
            return Err(EngineError::UnknownNode(node_id.to_string()));
        }
        self.change_state(PlaybackState::Normal);
        let result = self.enter_node(node_id);
        self.drain_intents();
        result
    }

    /// Advance host time: settle finished asset loads, reveal text, run the
    /// auto-advance countdown, then process queued intents.
    pub fn tick(&mut self, delta: Duration) {
        if self.disposed {
            self.poll_loads();
            return;
        }
        self.poll_loads();
        if self.state == PlaybackState::Typing {
            self.advance_reveal(delta);
        }
        self.update_auto_advance(delta);
        self.drain_intents();
    }

    /// Stop everything and release every slot asset. Further intents fail
    /// with [`EngineError::Disposed`]. Loads still in flight are released as
    /// they finish on later ticks.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.cancel_auto_advance();
        self.typewriter = None;
        self.intents.clear();
        self.cache.clear_all();
        self.disposed = true;
        info!(chapter_id = %self.graph.chapter_id(), "playback_engine_disposed");
    }

    pub fn advance(&mut self) -> Result<(), EngineError> {
        self.submit(Intent::Advance)
    }

    pub fn choose(&mut self, option_id: &str) -> Result<(), EngineError> {
        self.submit(Intent::Choose(option_id.to_string()))
    }

    pub fn toggle_auto_play(&mut self) -> Result<(), EngineError> {
        self.submit(Intent::ToggleAutoPlay)
    }

    pub fn open_history(&mut self) -> Result<(), EngineError> {
        self.submit(Intent::OpenHistory)
    }

    pub fn close_history(&mut self) -> Result<(), EngineError> {
        self.submit(Intent::CloseHistory)
    }

    pub fn pause(&mut self) -> Result<(), EngineError> {
        self.submit(Intent::Pause)
    }

    pub fn resume(&mut self) -> Result<(), EngineError> {
        self.submit(Intent::Resume)
    }

    /// Process `intent` now, then anything it caused to be queued.
    pub fn submit(&mut self, intent: Intent) -> Result<(), EngineError> {
        self.ensure_live()?;
        if self.processing {
            self.intents.push_back(intent);
            return Ok(());
        }
        self.processing = true;
        let result = self.apply_intent(intent);
        self.processing = false;
        self.drain_intents();
        result
    }

    /// Open a blocking popup (confirmation dialog and the like). Accepted
    /// from `Normal` or `Typing`; the reveal and auto-advance are held
    /// until [`end_interaction`](Self::end_interaction).
    pub fn begin_interaction(&mut self) -> Result<(), EngineError> {
        self.ensure_live()?;
        if self.popup_open
            || !matches!(self.state, PlaybackState::Normal | PlaybackState::Typing)
        {
            debug!(state = ?self.state, "popup_rejected");
            return Ok(());
        }
        self.cancel_auto_advance();
        if let Some(typewriter) = self.typewriter.as_mut() {
            typewriter.pause();
        }
        self.popup_open = true;
        self.popup_return = self.state;
        self.change_state(PlaybackState::Interacting);
        self.drain_intents();
        Ok(())
    }

    pub fn end_interaction(&mut self) -> Result<(), EngineError> {
        self.ensure_live()?;
        if !self.popup_open || self.state != PlaybackState::Interacting {
            return Ok(());
        }
        self.popup_open = false;
        if let Some(typewriter) = self.typewriter.as_mut() {
            typewriter.resume();
        }
        self.change_state(self.popup_return);
        self.drain_intents();
        Ok(())
    }

    /// Jump to `node_id` and begin its reveal.
    ///
    /// On an unknown id nothing changes. Any open overlay or popup is
    /// abandoned.
    pub fn play_node(&mut self, node_id: &str) -> Result<(), EngineError> {
        self.ensure_live()?;
        let result = self.enter_node(node_id);
        self.drain_intents();
        result
    }

    fn enter_node(&mut self, node_id: &str) -> Result<(), EngineError> {
        let Some(node) = self.graph.node(node_id).cloned() else {
            warn!(node_id = %node_id, "unknown_node");
            return Err(EngineError::UnknownNode(node_id.to_string()));
        };

        self.cancel_auto_advance();
        self.popup_open = false;
        self.chapter_finished = false;
        self.current = Some(node.id.clone());
        self.journey.record_visit(&node.id);
        self.history.push(&node.speaker, &node.content);
        info!(node_id = %node.id, speaker = %node.speaker, "node_entered");
        self.publish(EngineEvent::NodeEntered {
            node_id: node.id.clone(),
        });

        for slot in Slot::ALL {
            let directive = node.directive(slot);
            if !directive.is_keep() {
                self.request_stage(slot, directive);
            }
        }

        self.displayed_text.clear();
        self.typewriter = Some(Typewriter::new(&node.content, self.config.typing_interval));
        self.change_state(PlaybackState::Typing);
        self.poll_loads();
        Ok(())
    }

    pub fn snapshot(
        &self,
        metadata: BTreeMap<String, MetaValue>,
    ) -> Result<Snapshot, EngineError> {
        let node_id = self.current.as_deref().ok_or(EngineError::NotStarted)?;
        Ok(SnapshotCodec::build(
            self.graph.chapter_id(),
            node_id,
            &self.journey,
            self.history.to_vec(),
            self.cache.display_names(),
            metadata,
        ))
    }

    /// Put the engine at the snapshot's position with its stage rebuilt from
    /// scratch. The node's text is shown in full.
    pub fn restore(&mut self, snapshot: &Snapshot) -> Result<(), EngineError> {
        self.ensure_live()?;
        let restored = SnapshotCodec::restore(snapshot, &self.graph)?;

        self.cancel_auto_advance();
        self.typewriter = None;
        self.intents.clear();
        self.cache.clear_all();
        self.popup_open = false;
        self.chapter_finished = false;

        self.journey = restored.journey;
        self.history.replace(restored.history);
        self.current = Some(restored.node_id.clone());
        for (slot, directive) in restored.stage_plan {
            self.request_stage(slot, directive);
        }

        self.displayed_text = self
            .graph
            .node(&restored.node_id)
            .map(|node| node.content.clone())
            .unwrap_or_default();
        self.publish(EngineEvent::TextRevealed {
            text: self.displayed_text.clone(),
        });
        info!(
            node_id = %restored.node_id,
            visited = self.journey.visited().len(),
            "snapshot_restored"
        );
        self.publish(EngineEvent::Restored {
            node_id: restored.node_id,
        });
        self.settle_after_reveal();
        self.poll_loads();
        self.drain_intents();
        Ok(())
    }

    pub fn save_to(
        &mut self,
        index: usize,
        metadata: BTreeMap<String, MetaValue>,
    ) -> Result<(), EngineError> {
        let snapshot = self.snapshot(metadata)?;
        let store = self.store.as_mut().ok_or(EngineError::NoStore)?;
        store.save(index, &snapshot)?;
        info!(slot = index, node_id = %snapshot.current_node_id, "game_saved");
        Ok(())
    }

    pub fn load_from(&mut self, index: usize) -> Result<(), EngineError> {
        let store = self.store.as_ref().ok_or(EngineError::NoStore)?;
        let snapshot = store.load(index)?.ok_or(EngineError::EmptySlot(index))?;
        self.restore(&snapshot)
    }

    /// Occupied save slots.
    pub fn saved_slots(&self) -> Result<Vec<usize>, EngineError> {
        let store = self.store.as_ref().ok_or(EngineError::NoStore)?;
        Ok(store.list()?)
    }

    fn ensure_live(&self) -> Result<(), EngineError> {
        if self.disposed {
            return Err(EngineError::Disposed);
        }
        Ok(())
    }

    fn apply_intent(&mut self, intent: Intent) -> Result<(), EngineError> {
        debug!(intent = ?intent, state = ?self.state, "intent_applied");
        match intent {
            Intent::Advance => self.on_advance(),
            Intent::Choose(option_id) => self.on_choose(&option_id),
            Intent::ToggleAutoPlay => {
                self.auto_play = !self.auto_play;
                if !self.auto_play {
                    self.cancel_auto_advance();
                }
                info!(enabled = self.auto_play, "auto_play_toggled");
                self.publish(EngineEvent::AutoPlayToggled {
                    enabled: self.auto_play,
                });
                Ok(())
            }
            Intent::OpenHistory => self.open_overlay(PlaybackState::ViewingHistory),
            Intent::CloseHistory => self.close_overlay(PlaybackState::ViewingHistory),
            Intent::Pause => self.open_overlay(PlaybackState::Paused),
            Intent::Resume => self.close_overlay(PlaybackState::Paused),
        }
    }

    fn drain_intents(&mut self) {
        if self.processing {
            return;
        }
        self.processing = true;
        while let Some(intent) = self.intents.pop_front() {
            if let Err(err) = self.apply_intent(intent) {
                warn!(error = %err, "queued_intent_failed");
            }
            if self.disposed {
                self.intents.clear();
            }
        }
        self.processing = false;
    }

    fn on_advance(&mut self) -> Result<(), EngineError> {
        match self.state {
            PlaybackState::Typing => {
                self.finish_reveal(true);
                Ok(())
            }
            PlaybackState::Normal if !self.popup_open => {
                let Some(node) = self.current_node() else {
                    return Ok(());
                };
                if node.has_options() {
                    return Ok(());
                }
                let next = node.successor().map(str::to_string);
                match next {
                    Some(next) => self.enter_node(&next),
                    None => {
                        self.finish_chapter();
                        Ok(())
                    }
                }
            }
            _ => Ok(()),
        }
    }

    fn on_choose(&mut self, option_id: &str) -> Result<(), EngineError> {
        if self.state != PlaybackState::Interacting || self.popup_open {
            return Err(EngineError::NotInteracting(self.state));
        }
        let node_id = self.current.clone().ok_or(EngineError::NotStarted)?;
        let option = self
            .graph
            .node(&node_id)
            .and_then(|node| node.option(option_id))
            .cloned();
        let Some(option) = option else {
            warn!(node_id = %node_id, option_id = %option_id, "invalid_choice");
            return Err(EngineError::InvalidChoice {
                node: node_id,
                option: option_id.to_string(),
            });
        };

        // A loop back into an answered node keeps the first answer on record
        // but still follows the option picked now.
        if let Err(JourneyError::DuplicateChoice {
            existing,
            attempted,
            ..
        }) = self.journey.record_choice(&node_id, option_id)
        {
            warn!(
                node_id = %node_id,
                existing = %existing,
                attempted = %attempted,
                "duplicate_choice"
            );
            self.publish(EngineEvent::DuplicateChoice {
                node_id: node_id.clone(),
                existing,
                attempted,
            });
        }

        self.history.push_choice(&option.text);
        info!(node_id = %node_id, option_id = %option_id, target = %option.target_id, "choice_made");
        self.publish(EngineEvent::ChoiceMade {
            node_id,
            option_id: option_id.to_string(),
        });
        self.change_state(PlaybackState::Normal);

        if is_terminal_id(&option.target_id) {
            self.finish_chapter();
            return Ok(());
        }
        self.enter_node(&option.target_id)
    }

    fn open_overlay(&mut self, overlay: PlaybackState) -> Result<(), EngineError> {
        if self.state == overlay {
            return Ok(());
        }
        if self.popup_open || !self.state.accepts_overlay() {
            debug!(state = ?self.state, overlay = ?overlay, "overlay_rejected");
            return Ok(());
        }
        self.cancel_auto_advance();
        if let Some(typewriter) = self.typewriter.as_mut() {
            typewriter.pause();
        }
        self.change_state(overlay);
        Ok(())
    }

    fn close_overlay(&mut self, overlay: PlaybackState) -> Result<(), EngineError> {
        if self.state != overlay {
            return Ok(());
        }
        let back = self.previous_state;
        if let Some(typewriter) = self.typewriter.as_mut() {
            typewriter.resume();
        }
        self.change_state(back);
        Ok(())
    }

    fn finish_chapter(&mut self) {
        if self.chapter_finished {
            return;
        }
        self.chapter_finished = true;
        self.cancel_auto_advance();
        let node_id = self.current.clone().unwrap_or_default();
        info!(node_id = %node_id, "chapter_finished");
        self.publish(EngineEvent::ChapterFinished { node_id });
    }

    fn advance_reveal(&mut self, delta: Duration) {
        let Some(typewriter) = self.typewriter.as_mut() else {
            return;
        };
        match typewriter.tick(delta) {
            Ok(progress) => {
                if progress.emitted > 0 {
                    self.displayed_text = typewriter.displayed().to_string();
                    self.publish(EngineEvent::TextRevealed {
                        text: self.displayed_text.clone(),
                    });
                }
                if progress.finished {
                    self.finish_reveal(false);
                }
            }
            Err(err) => self.abort_reveal(err),
        }
    }

    /// End the reveal. Forced completion replaces the re-wrapped buffer
    /// with the raw content.
    fn finish_reveal(&mut self, forced: bool) {
        let Some(mut typewriter) = self.typewriter.take() else {
            return;
        };
        if forced {
            typewriter.complete();
            self.displayed_text = typewriter.displayed().to_string();
            self.publish(EngineEvent::TextRevealed {
                text: self.displayed_text.clone(),
            });
        }
        let node_id = self.current.clone().unwrap_or_default();
        debug!(node_id = %node_id, forced, "reveal_finished");
        self.publish(EngineEvent::RevealFinished { node_id, forced });
        self.settle_after_reveal();
    }

    fn abort_reveal(&mut self, err: MarkupError) {
        let node_id = self.current.clone().unwrap_or_default();
        warn!(node_id = %node_id, error = %err, "markup_unbalanced");
        if let Some(typewriter) = self.typewriter.take() {
            self.displayed_text = typewriter.content().to_string();
        }
        self.publish(EngineEvent::MarkupFailed {
            node_id: node_id.clone(),
            reason: err.to_string(),
        });
        self.publish(EngineEvent::TextRevealed {
            text: self.displayed_text.clone(),
        });
        self.publish(EngineEvent::RevealFinished {
            node_id,
            forced: true,
        });
        self.settle_after_reveal();
    }

    /// Text is fully shown: wait for the player, or for a choice.
    fn settle_after_reveal(&mut self) {
        self.change_state(PlaybackState::Normal);
        let Some(node) = self.current_node() else {
            return;
        };
        if !node.has_options() {
            return;
        }
        let node_id = node.id.clone();
        let options = node.options.clone();
        self.change_state(PlaybackState::Interacting);
        self.publish(EngineEvent::ChoicesPresented { node_id, options });
    }

    fn auto_advance_eligible(&self) -> bool {
        self.auto_play
            && self.state == PlaybackState::Normal
            && !self.popup_open
            && !self.chapter_finished
            && self.current_node().is_some_and(|node| !node.has_options())
    }

    /// Arms the countdown on the first eligible tick, fires on a later one.
    /// Losing eligibility drops the countdown outright.
    fn update_auto_advance(&mut self, delta: Duration) {
        if !self.auto_advance_eligible() {
            self.cancel_auto_advance();
            return;
        }
        match self.auto_timer.as_mut() {
            None => {
                self.auto_timer = Some(Timer::once(self.config.auto_play_interval));
                debug!(delay_ms = self.config.auto_play_interval.as_millis() as u64, "auto_advance_armed");
            }
            Some(timer) => {
                if timer.tick(delta) > 0 {
                    self.auto_timer = None;
                    debug!("auto_advance_fired");
                    self.intents.push_back(Intent::Advance);
                }
            }
        }
    }

    fn cancel_auto_advance(&mut self) {
        if let Some(mut timer) = self.auto_timer.take() {
            timer.cancel();
            debug!("auto_advance_cancelled");
        }
    }

    fn request_stage(&mut self, slot: Slot, directive: Directive) {
        let name = match &directive {
            Directive::Show(name) => Some(name.clone()),
            _ => None,
        };
        let request = self.cache.resolve(slot, directive);
        self.loads.push(
            async move {
                StageReport {
                    slot,
                    name,
                    result: request.await,
                }
            }
            .boxed(),
        );
    }

    /// Collect every slot request that has finished, without waiting.
    fn poll_loads(&mut self) {
        if self.loads.is_empty() {
            return;
        }
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut reports = Vec::new();
        while let Poll::Ready(Some(report)) = self.loads.poll_next_unpin(&mut cx) {
            reports.push(report);
        }
        if self.disposed {
            return;
        }
        for report in reports {
            self.report_stage(report);
        }
    }

    fn report_stage(&mut self, report: StageReport<L::Resource>) {
        let StageReport { slot, name, result } = report;
        match result {
            Ok(ResolveOutcome::Applied(_)) => {
                debug!(slot = ?slot, asset = ?name, "stage_applied");
                self.publish(EngineEvent::StageChanged { slot, asset: name });
            }
            Ok(ResolveOutcome::Cleared) => {
                self.publish(EngineEvent::StageChanged { slot, asset: None });
            }
            Ok(ResolveOutcome::Unchanged) => {}
            Ok(ResolveOutcome::Superseded) => {
                debug!(slot = ?slot, asset = ?name, "stage_request_superseded");
            }
            Err(CacheError::Load { name, reason }) => {
                warn!(slot = ?slot, asset = %name, reason = %reason, "stage_asset_failed");
                self.publish(EngineEvent::AssetFailed { slot, name, reason });
            }
        }
    }

    fn change_state(&mut self, to: PlaybackState) {
        if self.state == to {
            return;
        }
        let from = self.state;
        self.previous_state = from;
        self.state = to;
        debug!(from = ?from, to = ?to, "state_changed");
        self.publish(EngineEvent::StateChanged { from, to });
    }

    fn publish(&mut self, event: EngineEvent) {
        let follow_ups = self.events.publish(&event);
        self.intents.extend(follow_ups);
    }
}

impl<L: AssetLoader> std::fmt::Debug for PlaybackEngine<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackEngine")
            .field("chapter_id", &self.graph.chapter_id())
            .field("state", &self.state)
            .field("current", &self.current)
            .field("auto_play", &self.auto_play)
            .field("pending_loads", &self.loads.len())
            .finish()
    }
}
