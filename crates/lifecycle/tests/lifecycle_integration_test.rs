use lifecycle::{
    AdapterError, AsyncInferenceComponent, BatchHandle, DecodeError, DecodePolicy, FetchMode,
    FieldKind, FieldValue, Filterable, FrameBounds, HasLocation, InferenceAdapter,
    LifecycleError, LifecycleManager, LifecycleState, ManagerConfig, OutputSink, Rect, Region,
    ResultDecoder,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

struct Patch {
    width: u32,
    height: u32,
    mean: f32,
}

impl Patch {
    fn new(mean: f32) -> Self {
        Self {
            width: 4,
            height: 4,
            mean,
        }
    }
}

impl Region for Patch {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Runs each batch on its own thread after a fixed delay.
struct DelayedAdapter {
    delay: Duration,
    next_id: u64,
    pending: HashMap<u64, Receiver<Vec<f32>>>,
    finished: HashMap<u64, Vec<f32>>,
}

impl DelayedAdapter {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            next_id: 0,
            pending: HashMap::new(),
            finished: HashMap::new(),
        }
    }
}

impl InferenceAdapter for DelayedAdapter {
    type Input = Patch;
    type Output = f32;

    fn submit_batch(&mut self, items: Vec<Patch>) -> Result<BatchHandle, AdapterError> {
        self.next_id += 1;
        let (tx, rx) = mpsc::channel();
        let delay = self.delay;
        thread::spawn(move || {
            thread::sleep(delay);
            let _ = tx.send(items.iter().map(|p| p.mean * 2.0).collect());
        });
        self.pending.insert(self.next_id, rx);
        Ok(BatchHandle::new(self.next_id))
    }

    fn is_ready(&mut self, handle: BatchHandle) -> bool {
        if self.finished.contains_key(&handle.id()) {
            return true;
        }
        let Some(rx) = self.pending.get(&handle.id()) else {
            return false;
        };
        match rx.try_recv() {
            Ok(outputs) => {
                self.pending.remove(&handle.id());
                self.finished.insert(handle.id(), outputs);
                true
            }
            Err(_) => false,
        }
    }

    fn collect(
        &mut self,
        handle: BatchHandle,
        timeout: Duration,
    ) -> Result<Vec<f32>, AdapterError> {
        if let Some(outputs) = self.finished.remove(&handle.id()) {
            return Ok(outputs);
        }
        let rx = self
            .pending
            .remove(&handle.id())
            .ok_or(AdapterError::UnknownHandle(handle.id()))?;
        match rx.recv_timeout(timeout) {
            Ok(outputs) => Ok(outputs),
            Err(RecvTimeoutError::Timeout) => Err(AdapterError::Timeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(AdapterError::Disconnected),
        }
    }

    fn cancel(&mut self, handle: BatchHandle) {
        self.pending.remove(&handle.id());
        self.finished.remove(&handle.id());
    }
}

#[derive(Debug, Serialize)]
struct Brightness {
    location: Rect,
    level: f64,
    bright: bool,
}

impl HasLocation for Brightness {
    fn location(&self) -> Rect {
        self.location
    }
}

impl Filterable for Brightness {
    fn schema() -> &'static [(&'static str, FieldKind)] {
        &[("level", FieldKind::Number), ("bright", FieldKind::Flag)]
    }

    fn field(&self, name: &str) -> Option<FieldValue<'_>> {
        match name {
            "level" => Some(FieldValue::Number(self.level)),
            "bright" => Some(FieldValue::Flag(self.bright)),
            _ => None,
        }
    }
}

struct BrightnessDecoder;

impl ResultDecoder for BrightnessDecoder {
    type Raw = f32;
    type Output = Brightness;

    fn decode(&self, raw: f32, location: Rect) -> Result<Brightness, DecodeError> {
        if !raw.is_finite() {
            return Err(DecodeError::InvalidValue(raw.to_string()));
        }
        Ok(Brightness {
            location,
            level: raw as f64,
            bright: raw > 1.0,
        })
    }

    fn policy(&self) -> DecodePolicy {
        DecodePolicy::SkipItem
    }
}

fn config(name: &str, fetch_mode: FetchMode, timeout: Duration) -> ManagerConfig {
    ManagerConfig::new(name, FrameBounds::new(640, 480), 8)
        .with_fetch_mode(fetch_mode)
        .with_completion_timeout(timeout)
}

#[test]
fn test_blocking_cycle_with_background_computation() {
    let mut manager = LifecycleManager::new(
        config("brightness", FetchMode::Blocking, Duration::from_secs(5)),
        DelayedAdapter::new(Duration::from_millis(20)),
        BrightnessDecoder,
    );

    manager.enqueue(Patch::new(0.2), Rect::new(0, 0, 10, 10)).unwrap();
    manager.enqueue(Patch::new(0.9), Rect::new(20, 20, 5, 5)).unwrap();
    manager.submit_request().unwrap();

    assert!(manager.fetch_results().unwrap());
    assert_eq!(manager.results_len(), 2);
    assert_eq!(manager.location_result(0).unwrap(), Rect::new(0, 0, 10, 10));
    assert_eq!(manager.location_result(1).unwrap(), Rect::new(20, 20, 5, 5));
    assert_eq!(
        manager.filtered_rois("bright").unwrap(),
        vec![Rect::new(20, 20, 5, 5)]
    );
}

#[test]
fn test_polling_cycle_keeps_pipeline_responsive() {
    let mut manager = LifecycleManager::new(
        config("brightness", FetchMode::Polling, Duration::from_secs(5)),
        DelayedAdapter::new(Duration::from_millis(50)),
        BrightnessDecoder,
    );

    manager.enqueue(Patch::new(0.7), Rect::new(100, 100, 50, 50)).unwrap();
    manager.submit_request().unwrap();

    // Still computing: the first poll must not block.
    let started = Instant::now();
    assert!(!manager.fetch_results().unwrap());
    assert!(started.elapsed() < Duration::from_millis(50));
    assert_eq!(manager.state(), LifecycleState::InFlight);

    // Next frame's crops buffer up meanwhile.
    manager.enqueue(Patch::new(0.1), Rect::new(0, 0, 8, 8)).unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    let mut fetched = false;
    while Instant::now() < deadline {
        if manager.fetch_results().unwrap() {
            fetched = true;
            break;
        }
        thread::sleep(Duration::from_millis(5));
    }

    assert!(fetched, "batch should complete before the deadline");
    assert_eq!(manager.results_len(), 1);
    assert_eq!(manager.location_result(0).unwrap(), Rect::new(100, 100, 50, 50));
    assert_eq!(manager.state(), LifecycleState::Buffering);
}

#[test]
fn test_blocking_timeout_discards_batch_and_recovers() {
    let mut manager = LifecycleManager::new(
        config("slow", FetchMode::Blocking, Duration::from_millis(10)),
        DelayedAdapter::new(Duration::from_millis(500)),
        BrightnessDecoder,
    );

    manager.enqueue(Patch::new(0.5), Rect::new(0, 0, 10, 10)).unwrap();
    manager.submit_request().unwrap();

    let err = manager.fetch_results().unwrap_err();
    assert!(matches!(err, LifecycleError::Adapter(AdapterError::Timeout(_))));
    assert_eq!(manager.state(), LifecycleState::Idle);
    assert_eq!(manager.results_len(), 0);

    // The next cycle starts clean.
    assert!(!manager.fetch_results().unwrap());
    manager.enqueue(Patch::new(0.5), Rect::new(0, 0, 10, 10)).unwrap();
    manager.submit_request().unwrap();
    assert_eq!(manager.state(), LifecycleState::InFlight);
}

#[test]
fn test_components_behind_trait_objects() {
    let mut components: Vec<Box<dyn AsyncInferenceComponent<Region = Patch>>> = vec![
        Box::new(LifecycleManager::new(
            config("fast", FetchMode::Blocking, Duration::from_secs(5)),
            DelayedAdapter::new(Duration::ZERO),
            BrightnessDecoder,
        )),
        Box::new(LifecycleManager::new(
            config("slow", FetchMode::Blocking, Duration::from_secs(5)),
            DelayedAdapter::new(Duration::from_millis(10)),
            BrightnessDecoder,
        )),
    ];

    for component in components.iter_mut() {
        component
            .enqueue(Patch::new(0.8), Rect::new(10, 10, 20, 20))
            .unwrap();
        component.submit_request().unwrap();
    }

    let names: Vec<&str> = components.iter().map(|c| c.name()).collect();
    assert_eq!(names, ["fast", "slow"]);

    for component in components.iter_mut() {
        assert!(component.fetch_results().unwrap());
        assert_eq!(component.results_len(), 1);
        assert_eq!(
            component.filtered_rois("level > 1.5 && bright").unwrap(),
            vec![Rect::new(10, 10, 20, 20)]
        );
        assert!(component.location_result(1).is_err());
    }
}

struct JsonSink {
    lines: Vec<String>,
}

impl OutputSink<Brightness> for JsonSink {
    fn accept(&mut self, component: &str, results: &[&Brightness]) -> anyhow::Result<()> {
        for result in results {
            let line = serde_json::json!({ "component": component, "result": result });
            self.lines.push(serde_json::to_string(&line)?);
        }
        Ok(())
    }
}

#[test]
fn test_observe_output_serializes_selected_results() {
    let mut manager = LifecycleManager::new(
        config("brightness", FetchMode::Blocking, Duration::from_secs(5)),
        DelayedAdapter::new(Duration::ZERO),
        BrightnessDecoder,
    );
    manager.enqueue(Patch::new(0.1), Rect::new(0, 0, 10, 10)).unwrap();
    manager.enqueue(Patch::new(f32::NAN), Rect::new(10, 0, 10, 10)).unwrap();
    manager.enqueue(Patch::new(0.9), Rect::new(20, 0, 10, 10)).unwrap();
    manager.submit_request().unwrap();

    // The NaN output is skipped, the survivors keep their order.
    assert!(manager.fetch_results().unwrap());
    assert_eq!(manager.results_len(), 2);

    let mut sink = JsonSink { lines: Vec::new() };
    let delivered = manager.observe_output(&mut sink, "!bright").unwrap();

    assert_eq!(delivered, 1);
    let parsed: serde_json::Value = serde_json::from_str(&sink.lines[0]).unwrap();
    assert_eq!(parsed["component"], "brightness");
    assert_eq!(parsed["result"]["location"]["x"], 0);
    assert_eq!(parsed["result"]["bright"], false);
}
