//! vfdd - SR-IOV VF configuration daemon
//!
//! Entry point for the vfdd daemon.

use anyhow::Context;
use clap::Parser;
use nix::sys::signal::{self, SigHandler, Signal};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::signal::unix::{signal as unix_signal, SignalKind};
use tracing::{error, info, warn};

use vfd_nic::{DryRunNic, NicControl, TimeoutNic};
use vfdd::transport::{FifoReplySink, FifoSource};
use vfdd::{
    DaemonConfig, DirLoader, HotplugPhase, LogControl, QosPolicy, Reconciler, RefreshWorker,
    RequestServer, RunningConfig, ServerOptions, ShellHotplug, ShutdownController, SignalAction,
    VerbosityControl, DEFAULT_PARMS_PATH, TRAPPED_SIGNALS, VERSION,
};

/// Requests buffered between the request pipe and the server.
const REQUEST_QUEUE_DEPTH: usize = 128;

/// SR-IOV VF configuration daemon
#[derive(Parser, Debug)]
#[command(name = "vfdd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Parameter file
    #[arg(short = 'p', long, default_value = DEFAULT_PARMS_PATH)]
    parms: PathBuf,

    /// Run without touching NIC hardware
    #[arg(short = 'n', long)]
    no_nic: bool,

    /// Do not program traffic-class shares
    #[arg(short = 'q', long)]
    no_qos: bool,

    /// Hand truncated QoS points to the largest remainders
    #[arg(long)]
    qos_largest_remainder: bool,

    /// Verbosity (0 warn, 1 info, 2 debug, 3 trace); overrides the parameter file
    #[arg(short = 'l', long)]
    log_level: Option<u8>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("vfdd failed: {:#}", e);
            eprintln!("vfdd: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = DaemonConfig::load(&args.parms)
        .with_context(|| format!("cannot load {}", args.parms.display()))?;

    let log = Arc::new(LogControl::init(
        args.log_level.unwrap_or(config.init_log_level),
    )?);
    info!("--- Starting vfdd {} ---", VERSION);
    info!(
        parms = %args.parms.display(),
        pfs = config.pciids.len(),
        config_dir = %config.config_dir.display(),
        "parameters loaded"
    );

    if !args.no_nic {
        warn!("no hardware NIC binding in this build, running in dry-run mode");
    }
    let nic: Arc<dyn NicControl> = match config.nic_timeout() {
        Some(budget) => Arc::new(TimeoutNic::new(Arc::new(DryRunNic::new()), budget)?),
        None => Arc::new(DryRunNic::new()),
    };

    let running = Arc::new(RunningConfig::from_config(&config)?);
    let shutdown = Arc::new(ShutdownController::new(running.clone(), nic.clone()));

    let hook_ctl = shutdown.clone();
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic| {
        hook_ctl.fail("panic");
        default_hook(panic);
        std::process::abort();
    }));

    if let Err(e) = serve(&args, &config, log, nic, running, shutdown.clone()).await {
        let released = shutdown.fail("start-up failed");
        error!(released, "start-up failed, ports released");
        shutdown.close();
        return Err(e);
    }
    Ok(())
}

/// Everything from signal set-up to the end of shutdown. An error here is a
/// start-up failure; the caller releases the ports.
async fn serve(
    args: &Args,
    config: &DaemonConfig,
    log: Arc<LogControl>,
    nic: Arc<dyn NicControl>,
    running: Arc<RunningConfig>,
    shutdown: Arc<ShutdownController>,
) -> anyhow::Result<()> {
    for &sig in TRAPPED_SIGNALS {
        let mut stream = unix_signal(SignalKind::from_raw(sig as i32))
            .with_context(|| format!("cannot trap {}", sig))?;
        let ctl = shutdown.clone();
        tokio::spawn(async move {
            while stream.recv().await.is_some() {
                if ctl.handle_signal(sig) == SignalAction::Abort {
                    reraise(sig);
                }
            }
        });
    }

    let reconciler = Reconciler::new(nic);
    // The dry-run backend never resets a VF; a hardware binding hands this
    // notifier to its reset event callback.
    let (worker, resets) =
        RefreshWorker::spawn(running.clone(), reconciler.clone(), config.refresh_queue_depth)?;

    let source = FifoSource::open(&config.fifo_path, REQUEST_QUEUE_DEPTH)?;
    let options = ServerOptions {
        delete_keep: config.delete_keep,
        enable_qos: config.enable_qos && !args.no_qos,
        qos_policy: if args.qos_largest_remainder {
            QosPolicy::LargestRemainder
        } else {
            QosPolicy::Truncate
        },
    };
    let mut server = RequestServer::new(
        running,
        reconciler,
        Arc::new(DirLoader::new(&config.config_dir)),
        Box::new(source),
        Arc::new(FifoReplySink::new(config.reply_timeout())),
    )
    .with_options(options)
    .with_verbosity(log.clone())
    .with_hotplug(Arc::new(ShellHotplug::new(config.hotplug_timeout())));

    server.apply_all();
    server.replay().await;

    if args.log_level.is_none() {
        log.set_verbosity(config.log_level)?;
    }
    info!("vfdd initialization complete");

    server.run(&shutdown).await;
    shutdown.begin("request server stopped");

    let stopped = server.run_callbacks(HotplugPhase::Stop).await;
    info!(callbacks = stopped, "stop callbacks fired");
    server.close();

    drop(resets);
    if tokio::task::spawn_blocking(move || worker.stop())
        .await
        .is_err()
    {
        warn!("refresh worker did not stop cleanly");
    }

    let released = shutdown.release_ports();
    info!(released, "ports released");
    shutdown.close();
    Ok(())
}

/// Restores the default action for `sig` and raises it again so the
/// process dies the way the signal intended.
fn reraise(sig: Signal) {
    // SAFETY: SigDfl runs no handler code in this process.
    if let Err(e) = unsafe { signal::signal(sig, SigHandler::SigDfl) } {
        error!(signal = %sig, error = %e, "cannot restore default signal action");
    }
    if let Err(e) = signal::raise(sig) {
        error!(signal = %sig, error = %e, "cannot re-raise signal");
    }
    std::process::abort();
}
