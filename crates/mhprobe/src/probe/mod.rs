//! Probe orchestration.
//!
//! [`Probe`] accepts requests from peers and from the local node, applies
//! admission control, runs the random walk and reports exactly one outcome
//! per request to the listener attached to it.
//!
//! Timers (admission expiry, local response delays and reply timeouts) run
//! as tasks on the tokio runtime the probe was built on.

mod bridge;
pub mod htl;
mod listener;
mod responder;
mod router;

use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
    time::Duration,
};

use rand::{rngs::StdRng, RngCore, SeedableRng};
use rand_distr::{Distribution, Exp};
use tokio::runtime::Handle;
use tracing::{debug, trace, warn};

use crate::{
    admission::{AdmissionTable, Source},
    config::ProbeConfig,
    error::Result,
    protocol::{Outcome, ProbeError, ProbeMessage, ProbeRequest, ProbeType},
    settings::SharedSettings,
    transport::Transport,
    PeerId,
};

pub use listener::{Listener, ProbeHandle};
pub use responder::{
    random_noise, NodeStats, Responder, StaticStats, BANDWIDTH_SIGMA, IDENTIFIER_UPTIME_SIGMA,
    LINK_LENGTH_SIGMA, STORE_SIZE_SIGMA, UPTIME_48H_SIGMA, UPTIME_7D_SIGMA,
};
pub use router::acceptance_probability;

use listener::{LocalSink, RelaySink};
use router::Route;

/// Probe subsystem of one node.
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Probe {
    inner: Arc<Inner>,
}

/// Non-owning reference to a [`Probe`], for holders the probe itself
/// keeps alive such as its transport.
#[derive(Clone)]
pub struct WeakProbe {
    inner: Weak<Inner>,
}

impl WeakProbe {
    /// The probe, if it is still alive.
    pub fn upgrade(&self) -> Option<Probe> {
        self.inner.upgrade().map(|inner| Probe { inner })
    }
}

struct Inner {
    config: ProbeConfig,
    transport: Arc<dyn Transport>,
    responder: Responder,
    settings: SharedSettings,
    admission: AdmissionTable,
    rng: Mutex<Box<dyn RngCore + Send>>,
    runtime: Handle,
}

/// Builder for [`Probe`]
pub struct ProbeBuilder {
    transport: Arc<dyn Transport>,
    stats: Arc<dyn NodeStats>,
    config: ProbeConfig,
    settings: Option<SharedSettings>,
    rng: Option<Box<dyn RngCore + Send>>,
    runtime: Option<Handle>,
}

impl ProbeBuilder {
    pub fn new(transport: Arc<dyn Transport>, stats: Arc<dyn NodeStats>) -> Self {
        Self { transport, stats, config: ProbeConfig::default(), settings: None, rng: None, runtime: None }
    }

    /// Set the protocol tunables
    pub fn config(mut self, config: ProbeConfig) -> Self {
        self.config = config;
        self
    }

    /// Share response settings with the rest of the node
    pub fn settings(mut self, settings: SharedSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Use a specific random source, e.g. a seeded one for reproducible runs
    pub fn rng(mut self, rng: impl RngCore + Send + 'static) -> Self {
        self.rng = Some(Box::new(rng));
        self
    }

    /// Run timers on `runtime` instead of the current one
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Build the probe.
    ///
    /// Fails if no runtime was given and this is not called from within one.
    pub fn build(self) -> Result<Probe> {
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current()?,
        };
        let settings = self.settings.unwrap_or_default();
        let rng = self.rng.unwrap_or_else(|| Box::new(StdRng::from_entropy()));

        Ok(Probe {
            inner: Arc::new(Inner {
                admission: AdmissionTable::new(self.config.peer_limit, self.config.local_limit),
                responder: Responder::new(settings.clone(), self.stats),
                config: self.config,
                transport: self.transport,
                settings,
                rng: Mutex::new(rng),
                runtime,
            }),
        })
    }
}

impl Probe {
    pub fn builder(transport: Arc<dyn Transport>, stats: Arc<dyn NodeStats>) -> ProbeBuilder {
        ProbeBuilder::new(transport, stats)
    }

    pub fn downgrade(&self) -> WeakProbe {
        WeakProbe { inner: Arc::downgrade(&self.inner) }
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.inner.config
    }

    pub fn settings(&self) -> &SharedSettings {
        &self.inner.settings
    }

    pub fn admission(&self) -> &AdmissionTable {
        &self.inner.admission
    }

    /// Start a probe from this node.
    ///
    /// The handle resolves to `None` only if the request was discarded
    /// outright, which happens for an `htl` of 0.
    pub fn start(&self, htl: u8, uid: u64, probe_type: ProbeType) -> ProbeHandle {
        let (sink, handle) = LocalSink::channel();
        self.start_with_listener(htl, uid, probe_type, Arc::new(sink));
        handle
    }

    /// Start a probe from this node and report its outcome to `listener`.
    pub fn start_with_listener(
        &self,
        htl: u8,
        uid: u64,
        probe_type: ProbeType,
        listener: Arc<dyn Listener>,
    ) {
        debug!("Starting {} probe {} with htl {}", probe_type, uid, htl);
        self.request(Source::Local, uid, htl, probe_type.code(), listener);
    }

    /// Handle a probe message received from `source`.
    ///
    /// Only requests are handled here; replies reach the probe through the
    /// transport's reply filters.
    pub fn handle_message(&self, source: PeerId, message: ProbeMessage) {
        match message {
            ProbeMessage::Request { uid, htl, probe_type } => {
                trace!("Received probe request {} from {}", uid, source);
                let listener = Arc::new(RelaySink {
                    transport: Arc::clone(&self.inner.transport),
                    source,
                    uid,
                });
                self.request(Source::Peer(source), uid, htl, probe_type, listener);
            },
            other => {
                debug!("Unsolicited {:?} for probe {} from {}", other.kind(), other.uid(), source)
            },
        }
    }

    fn request(&self, source: Source, uid: u64, htl: u8, type_code: u8, listener: Arc<dyn Listener>) {
        let probe_type = match ProbeType::from_code(type_code) {
            Ok(probe_type) => probe_type,
            Err(e) => {
                debug!("Rejecting probe {} from {:?}: {}", uid, source, e);
                listener.on_outcome(Outcome::Error {
                    error: ProbeError::UnrecognizedType,
                    code: Some(type_code),
                    local: true,
                });
                return;
            },
        };

        let max_htl = self.inner.config.max_htl;
        if htl > max_htl {
            debug!("Clamping htl {} of probe {} from {:?} to {}", htl, uid, source, max_htl);
        }
        let Some(htl) = htl::clamp(htl, max_htl) else {
            warn!("Discarding probe {} from {:?} with invalid htl {}", uid, source, htl);
            return;
        };

        if !self.inner.admission.try_admit(&source) {
            debug!("Refusing probe {} from {:?}: too many accepted probes", uid, source);
            listener.on_outcome(Outcome::local_error(ProbeError::Overload));
            return;
        }
        self.schedule_release(source);

        let decrement_probability = self.inner.config.decrement_probability;
        let htl = htl::probabilistic_decrement(htl, decrement_probability, &mut **self.rng());
        let request = ProbeRequest::new(uid, htl, probe_type);

        if htl == 0 {
            self.respond_locally(request, listener);
            return;
        }

        let transport = self.inner.transport.as_ref();
        let route = router::route(transport, &self.inner.config, &self.inner.rng, request);

        match route {
            Route::Forwarded(pending) => {
                trace!("Awaiting {} for probe {} for {:?}", pending.peer, uid, pending.timeout);
                self.inner.runtime.spawn(bridge::await_reply(
                    pending.receiver,
                    pending.filter,
                    pending.timeout,
                    listener,
                ));
            },
            Route::Local => self.respond_locally(request, listener),
            Route::Failed(error) => listener.on_outcome(Outcome::local_error(error)),
        }
    }

    /// Free the admission slot of `source` once the window has passed,
    /// whatever became of the probe.
    fn schedule_release(&self, source: Source) {
        let inner = Arc::clone(&self.inner);
        self.inner.runtime.spawn(async move {
            tokio::time::sleep(inner.config.admission_window).await;
            inner.admission.release(&source);
        });
    }

    /// Answer after a random delay, so the response time does not reveal
    /// that this node is the endpoint.
    fn respond_locally(&self, request: ProbeRequest, listener: Arc<dyn Listener>) {
        let delay = response_delay(&self.inner.config, &mut **self.rng());
        trace!("Answering probe {} locally in {:?}", request.uid, delay);

        let inner = Arc::clone(&self.inner);
        self.inner.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let peers = inner.transport.connected_peers();
            let outcome = {
                let mut rng = inner.rng.lock().unwrap_or_else(PoisonError::into_inner);
                inner.responder.respond(request.probe_type, &peers, &mut **rng)
            };
            listener.on_outcome(outcome);
        });
    }

    fn rng(&self) -> MutexGuard<'_, Box<dyn RngCore + Send>> {
        self.inner.rng.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Probe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Probe")
            .field("config", &self.inner.config)
            .field("admission", &self.inner.admission)
            .finish_non_exhaustive()
    }
}

/// Exponentially distributed delay with mean `wait_base / e`, resampled
/// until it falls below `wait_max`.
pub fn response_delay(config: &ProbeConfig, rng: &mut dyn RngCore) -> Duration {
    let base = config.wait_base.as_secs_f64() * 1000.0;
    let max = config.wait_max.as_secs_f64() * 1000.0;
    if base <= 0.0 || max <= 0.0 {
        return Duration::ZERO;
    }

    let Ok(exp) = Exp::new(std::f64::consts::E / base) else {
        return Duration::ZERO;
    };
    loop {
        let millis: f64 = exp.sample(rng);
        if millis < max {
            return Duration::from_secs_f64(millis / 1000.0);
        }
    }
}
