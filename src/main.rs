//! `omec-charm`: the dispatch binary of the OMEC charms.
//!
//! Each charm's `dispatch` script execs `omec-charm <charm>`; Juju provides the hook in
//! `JUJU_DISPATCH_PATH`.

use clap::Parser;
use clap::ValueEnum;
use omec_charms::charms::HssCharm;
use omec_charms::charms::MmeCharm;
use omec_charms::charms::SpgwcCharm;
use omec_charms::charms::SpgwuCharm;
use omec_charms::config::CharmEnv;
use omec_charms::dispatch;
use omec_charms::k8s::K8sRepository;
use omec_charms::pebble::Pebble;
use omec_charms::state::StoredState;
use omec_charms::unit::HookTools;
use omec_charms::Charm;
use omec_charms::Hook;
use omec_charms::Model;

#[derive(Parser)]
#[clap(name = "omec-charm")]
#[clap(author, version, about)]
#[clap(about = "Handles a Juju hook for one of the OMEC charms")]
struct Cli {
    /// The charm whose hook is dispatched
    #[arg(value_enum)]
    charm: CharmKind,
    /// Hook or action path, e.g. `hooks/install`
    #[arg(long, env = "JUJU_DISPATCH_PATH")]
    dispatch_path: String,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum CharmKind {
    Hss,
    Mme,
    Spgwc,
    Spgwu,
}

impl CharmKind {
    fn charm(self) -> Box<dyn Charm<K8sRepository, HookTools, Pebble>> {
        match self {
            CharmKind::Hss => Box::new(HssCharm),
            CharmKind::Mme => Box::new(MmeCharm),
            CharmKind::Spgwc => Box::new(SpgwcCharm),
            CharmKind::Spgwu => Box::new(SpgwuCharm),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Juju captures stderr in the unit's debug log
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let hook: Hook = cli.dispatch_path.parse()?;
    let env = CharmEnv::from_env()?;
    tracing::info!(charm = ?cli.charm, hook = %hook, unit = %env.unit_name, "Dispatching");

    let state_path = env.state_path();
    let state = StoredState::load(&state_path)?;
    let cluster = K8sRepository::in_cluster();
    let workload = Pebble::new(env.containers_dir.clone());
    let mut model = Model::new(env, cluster, HookTools, workload, state);

    dispatch(cli.charm.charm().as_ref(), &mut model, hook).await?;
    model.state.save(&state_path)?;

    Ok(())
}
