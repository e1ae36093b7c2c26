/// Background slicing session — a worker thread driven over channels.
///
/// The host sends [`Request`]s and reads [`Event`]s back in order:
/// `ready` once the worker is up, `parse` after a mesh is loaded,
/// `progress`* then `prepare.done` for a slice, `export` with the program
/// text, or `error` when a request fails. A failed request leaves the
/// session usable, so the host can fix its input and retry.
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::SlicerSettings;
use crate::error::{Result, SliceError};
use crate::gcode::emit_gcode;
use crate::geometry::{Layer, Mesh};
use crate::pipeline::{build_layers, CancelToken, Cancellable};

#[derive(Debug, Clone)]
pub enum Request {
    /// Load the mesh to slice, replacing any previous one.
    Parse(Mesh),
    /// Slice the loaded mesh.
    Slice(SlicerSettings),
    /// Emit G-code for the last successful slice.
    Export,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event")]
pub enum Event {
    #[serde(rename = "ready")]
    Ready,
    #[serde(rename = "parse")]
    Parsed { triangles: usize },
    #[serde(rename = "progress")]
    Progress { percent: f64 },
    #[serde(rename = "prepare.done")]
    PrepareDone { layers: usize },
    #[serde(rename = "export")]
    Exported { gcode: String },
    #[serde(rename = "error")]
    Failed { message: String },
}

/// Handle to the worker. Dropping it closes the request channel and joins
/// the thread.
pub struct SliceSession {
    requests: Option<Sender<Request>>,
    events: Receiver<Event>,
    cancel: CancelToken,
    worker: Option<JoinHandle<()>>,
}

impl SliceSession {
    pub fn spawn() -> Result<Self> {
        let (req_tx, req_rx) = mpsc::channel();
        let (ev_tx, ev_rx) = mpsc::channel();
        let cancel = CancelToken::new();
        let token = cancel.clone();
        let worker = thread::Builder::new()
            .name("fdmslice-session".into())
            .spawn(move || Engine::new(ev_tx, token).run(req_rx))?;
        Ok(Self {
            requests: Some(req_tx),
            events: ev_rx,
            cancel,
            worker: Some(worker),
        })
    }

    pub fn send(&self, request: Request) -> Result<()> {
        self.requests
            .as_ref()
            .ok_or(SliceError::SessionClosed)?
            .send(request)
            .map_err(|_| SliceError::SessionClosed)
    }

    /// Block until the next event.
    pub fn recv(&self) -> Result<Event> {
        self.events.recv().map_err(|_| SliceError::SessionClosed)
    }

    pub fn try_recv(&self) -> Option<Event> {
        self.events.try_recv().ok()
    }

    /// Stop the slice in progress; if the worker is idle, the next slice
    /// stops before its first layer.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Drop for SliceSession {
    fn drop(&mut self) {
        self.requests.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Slicing session worker panicked");
            }
        }
    }
}

/// Worker-side state: the loaded mesh and the last slice.
struct Engine {
    events: Sender<Event>,
    cancel: CancelToken,
    mesh: Option<Mesh>,
    sliced: Option<(SlicerSettings, Vec<Layer>)>,
}

impl Engine {
    fn new(events: Sender<Event>, cancel: CancelToken) -> Self {
        Self {
            events,
            cancel,
            mesh: None,
            sliced: None,
        }
    }

    fn run(mut self, requests: Receiver<Request>) {
        self.emit(Event::Ready);
        for request in requests {
            let outcome = match request {
                Request::Parse(mesh) => self.parse(mesh),
                Request::Slice(settings) => self.slice(settings),
                Request::Export => self.export(),
            };
            match outcome {
                Ok(event) => self.emit(event),
                Err(e) => {
                    debug!(error = %e, "Session request failed");
                    self.emit(Event::Failed {
                        message: e.to_string(),
                    });
                }
            }
        }
        debug!("Slicing session closed");
    }

    fn emit(&self, event: Event) {
        // The host hung up; the loop ends when its request sender drops.
        let _ = self.events.send(event);
    }

    fn parse(&mut self, mesh: Mesh) -> Result<Event> {
        let triangles = mesh.triangles().len();
        self.mesh = Some(mesh);
        self.sliced = None;
        Ok(Event::Parsed { triangles })
    }

    fn slice(&mut self, settings: SlicerSettings) -> Result<Event> {
        let mesh = self.mesh.as_ref().ok_or(SliceError::EmptyGeometry)?;
        let events = self.events.clone();
        let mut observer = Cancellable::new(
            move |percent: f64| {
                let _ = events.send(Event::Progress { percent });
            },
            self.cancel.clone(),
        );
        let result = build_layers(mesh, &settings, &mut observer);
        self.cancel.reset();
        let layers = result?;
        info!(layers = layers.len(), "Session slice prepared");
        let event = Event::PrepareDone {
            layers: layers.len(),
        };
        self.sliced = Some((settings, layers));
        Ok(event)
    }

    fn export(&self) -> Result<Event> {
        let mesh = self.mesh.as_ref().ok_or(SliceError::NotSliced)?;
        let (settings, layers) = self.sliced.as_ref().ok_or(SliceError::NotSliced)?;
        let program = emit_gcode(layers, settings, mesh.bounds());
        Ok(Event::Exported {
            gcode: program.to_string(),
        })
    }
}
