//! The request server.
//!
//! Requests are taken from a [`RequestSource`] one batch at a time: after
//! waking for a request the server keeps handling whatever is already queued
//! until the source is empty, then waits again. Each request is validated,
//! applied to the running configuration, reconciled and answered before the
//! next one is looked at.
//!
//! Hardware call failures do not fail a request. They are logged by the
//! reconciler and summarised in the reply message.

use crate::error::{VfdError, VfdResult};
use crate::hotplug::{self, HotplugPhase, HotplugTrigger, NoopHotplug};
use crate::lifecycle::ShutdownController;
use crate::logging::{AtomicVerbosity, VerbosityControl};
use crate::model::RunningConfig;
use crate::qos::QosPolicy;
use crate::reconciler::{ReconcileReport, Reconciler};
use crate::request::{Reply, Request, RequestKind};
use crate::show::{self, ShowSelector};
use crate::transport::{ReplySink, RequestSource};
use crate::validator;
use crate::vf_config::ConfigLoader;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Behaviour switches for the request server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerOptions {
    /// Leave a VF's config resource in place after it is deleted.
    pub delete_keep: bool,
    /// Program traffic-class shares after every change.
    pub enable_qos: bool,
    pub qos_policy: QosPolicy,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            delete_keep: false,
            enable_qos: true,
            qos_policy: QosPolicy::default(),
        }
    }
}

/// Serves requests against the running configuration.
pub struct RequestServer {
    config: Arc<RunningConfig>,
    reconciler: Reconciler,
    loader: Arc<dyn ConfigLoader>,
    source: Box<dyn RequestSource>,
    replies: Arc<dyn ReplySink>,
    verbosity: Arc<dyn VerbosityControl>,
    hotplug: Arc<dyn HotplugTrigger>,
    options: ServerOptions,
}

impl RequestServer {
    /// Creates a new server with default options, no hot-plug callbacks
    /// and a verbosity setting that only records the level.
    pub fn new(
        config: Arc<RunningConfig>,
        reconciler: Reconciler,
        loader: Arc<dyn ConfigLoader>,
        source: Box<dyn RequestSource>,
        replies: Arc<dyn ReplySink>,
    ) -> Self {
        Self {
            config,
            reconciler,
            loader,
            source,
            replies,
            verbosity: Arc::new(AtomicVerbosity::new(1)),
            hotplug: Arc::new(NoopHotplug),
            options: ServerOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ServerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_verbosity(mut self, verbosity: Arc<dyn VerbosityControl>) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn with_hotplug(mut self, hotplug: Arc<dyn HotplugTrigger>) -> Self {
        self.hotplug = hotplug;
        self
    }

    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    /// Serves requests until shutdown begins or the source closes.
    pub async fn run(&mut self, shutdown: &ShutdownController) {
        info!("request server running");
        loop {
            let next = tokio::select! {
                _ = shutdown.terminated() => None,
                request = self.source.recv() => {
                    if request.is_none() {
                        info!("request source closed");
                    }
                    request
                }
            };
            let Some(request) = next else {
                break;
            };

            self.handle(request).await;
            let drained = self.drain().await;
            if drained > 0 {
                debug!(drained, "request batch drained");
            }
        }
        info!("request server stopped");
    }

    /// Handles every request already queued. Returns how many were handled.
    pub async fn drain(&mut self) -> usize {
        let mut handled = 0;
        while let Some(request) = self.source.try_recv() {
            self.handle(request).await;
            handled += 1;
        }
        handled
    }

    /// Stops the source from accepting further requests.
    pub fn close(&mut self) {
        self.source.close();
    }

    /// Processes one request and delivers its reply.
    pub async fn handle(&self, request: Request) {
        let reply = match self.process(&request).await {
            Ok(msg) => Reply::ok(msg),
            Err(e) => {
                if e.is_request_error() {
                    info!(kind = %request.kind, error = %e, "request rejected");
                } else {
                    warn!(kind = %request.kind, error = %e, "request failed");
                }
                Reply::error(&e)
            }
        };

        if let Err(e) = self.replies.deliver(&request.reply_to, &reply).await {
            warn!(reply_to = %request.reply_to, error = %e, "reply not delivered");
        }
    }

    /// Runs a request and returns the reply message.
    pub async fn process(&self, request: &Request) -> VfdResult<String> {
        debug!(kind = %request.kind, resource = ?request.resource, "processing request");
        match request.kind {
            RequestKind::Add => self.add_vf(required_resource(request)?).await,
            RequestKind::Delete => self.delete_vf(required_resource(request)?).await,
            RequestKind::Show => {
                let selector = ShowSelector::parse(request.resource.as_deref())?;
                show::render_stats(&self.config, self.reconciler.nic().as_ref(), &selector)
            }
            RequestKind::Ping => Ok(format!("pong: vfd {}", crate::VERSION)),
            RequestKind::SetVerbosity => {
                let level = request.log_level.ok_or_else(|| {
                    VfdError::validation("verbose request carries no log level")
                })?;
                self.verbosity.set_verbosity(level)?;
                Ok(format!("log level set to {}", level))
            }
            RequestKind::Dump => {
                let dump = show::render_dump(&self.config);
                for line in dump.lines() {
                    info!("dump: {}", line);
                }
                Ok(dump)
            }
        }
    }

    /// Validates the VF defined by `resource`, installs it and pushes it to
    /// the NIC. An existing VF with the same number is replaced outright.
    #[instrument(skip(self))]
    pub async fn add_vf(&self, resource: &str) -> VfdResult<String> {
        let def = self
            .loader
            .load(resource)
            .map_err(|e| VfdError::validation(format!("cannot load {}: {}", resource, e)))?;
        let shared = self.config.port_by_pciid(&def.pciid).ok_or_else(|| {
            VfdError::validation(format!("{} is not a managed PF", def.pciid))
        })?;

        let (num, pciid, report, start_cb) = {
            let mut port = shared.lock();
            let slot = validator::admit(&port, &def)?;
            let num = slot.num;
            port.install(slot)?;

            let mut report = self.reconciler.reconcile(&mut port);
            if self.options.enable_qos && port.qos {
                report.merge(self.reconciler.program_qos(&port, self.options.qos_policy));
            }
            let start_cb = port
                .vf(num)
                .and_then(|vf| vf.start_cb.clone().map(|cmd| (vf.owner, cmd)));
            (num, port.pciid, report, start_cb)
        };

        if let Some((owner, cmd)) = start_cb {
            self.hotplug.fire(owner, &cmd, HotplugPhase::Start).await;
        }

        info!(vf = num, %pciid, calls = report.calls, "VF added");
        Ok(outcome(format!("VF {} on {} added", num, pciid), &report))
    }

    /// Tears down the VF defined by `resource` and frees its slot.
    #[instrument(skip(self))]
    pub async fn delete_vf(&self, resource: &str) -> VfdResult<String> {
        let def = self.loader.load(resource).map_err(|e| {
            debug!(resource, error = %e, "cannot load config for delete");
            VfdError::not_found(format!("VF config {}", resource))
        })?;
        let shared = self
            .config
            .port_by_pciid(&def.pciid)
            .ok_or_else(|| VfdError::not_found(format!("PF {}", def.pciid)))?;
        let missing = || VfdError::not_found(format!("VF {} on {}", def.vfid, def.pciid));
        let num = i32::try_from(def.vfid).map_err(|_| missing())?;

        let stop_cb = {
            let port = shared.lock();
            let vf = port.vf(num).ok_or_else(missing)?;
            vf.stop_cb.clone().map(|cmd| (vf.owner, cmd))
        };
        if let Some((owner, cmd)) = stop_cb {
            self.hotplug.fire(owner, &cmd, HotplugPhase::Stop).await;
        }

        let report = {
            let mut port = shared.lock();
            if !port.mark_deleted(num) {
                return Err(missing());
            }
            let mut report = self.reconciler.reconcile(&mut port);
            if self.options.enable_qos && port.qos {
                report.merge(self.reconciler.program_qos(&port, self.options.qos_policy));
            }
            report
        };

        if !self.options.delete_keep {
            if let Err(e) = self.loader.discard(resource) {
                warn!(resource, error = %e, "VF config not removed");
            }
        }

        info!(vf = num, pciid = %def.pciid, calls = report.calls, "VF deleted");
        Ok(outcome(
            format!("VF {} on {} deleted", num, def.pciid),
            &report,
        ))
    }

    /// Adds every VF the loader knows about. Used at start-up to restore
    /// VFs configured before a restart; resources that fail are logged and
    /// skipped. Returns how many were added.
    pub async fn replay(&self) -> usize {
        let resources = match self.loader.list() {
            Ok(resources) => resources,
            Err(e) => {
                warn!(error = %e, "cannot list VF configs");
                return 0;
            }
        };

        let mut added = 0;
        for resource in &resources {
            match self.add_vf(resource).await {
                Ok(_) => added += 1,
                Err(e) => warn!(resource = %resource, error = %e, "VF config skipped"),
            }
        }
        info!(added, total = resources.len(), "VF configs restored");
        added
    }

    /// Reconciles every port and programs QoS where enabled.
    pub fn apply_all(&self) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        for port in self.config.ports() {
            let mut port = port.lock();
            report.merge(self.reconciler.reconcile(&mut port));
            if self.options.enable_qos && port.qos {
                report.merge(self.reconciler.program_qos(&port, self.options.qos_policy));
            }
        }
        if !report.is_clean() {
            warn!(failures = %report.failure_summary(), "port set-up incomplete");
        }
        report
    }

    /// Fires the `phase` callback of every active VF.
    pub async fn run_callbacks(&self, phase: HotplugPhase) -> usize {
        let mut pending = Vec::new();
        for port in self.config.ports() {
            pending.extend(hotplug::callbacks(&port.lock(), phase));
        }
        for (owner, cmd) in &pending {
            self.hotplug.fire(*owner, cmd, phase).await;
        }
        pending.len()
    }
}

fn required_resource(request: &Request) -> VfdResult<&str> {
    request
        .resource
        .as_deref()
        .ok_or_else(|| VfdError::validation(format!("{} request names no VF config", request.kind)))
}

fn outcome(msg: String, report: &ReconcileReport) -> String {
    if report.is_clean() {
        msg
    } else {
        format!(
            "{}; {} hardware call(s) failed: {}",
            msg,
            report.failures.len(),
            report.failure_summary()
        )
    }
}
