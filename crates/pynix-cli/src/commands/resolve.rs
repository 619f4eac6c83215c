//! Handler for `pynix resolve`.

use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;

use miette::Result;

use pynix_core::config::ResolveConfig;
use pynix_core::requirement::{parse_requirements, Requirement};
use pynix_core::target::Target;
use pynix_resolver::graph::{finalize, print_tree};
use pynix_resolver::provider::conda::CondaProvider;
use pynix_resolver::provider::nixpkgs::NixpkgsProvider;
use pynix_resolver::provider::platform::PlatformProvider;
use pynix_resolver::provider::sdist::SdistProvider;
use pynix_resolver::provider::wheel::WheelProvider;
use pynix_resolver::provider::DependencyProvider;
use pynix_resolver::{CombinedProvider, ResolveOptions, Resolver};
use pynix_store::conda::CondaChannel;
use pynix_store::nixpkgs::NixpkgsIndex;
use pynix_store::BucketStore;
use pynix_util::errors::{PynixError, PynixResult};
use pynix_util::progress::{spinner, status, status_info, status_warn};

const CONFIG_FILE: &str = "pynix.toml";

pub fn exec(
    config: Option<&Path>,
    requirements_file: Option<&Path>,
    reqs: &[String],
    tree: bool,
    output: Option<&Path>,
) -> Result<()> {
    let config = load_config(config)?;
    let target = config.target()?;
    let roots = collect_requirements(requirements_file, reqs)?;
    if roots.is_empty() {
        return Err(PynixError::Config {
            message: "no requirements given".to_string(),
        }
        .into());
    }

    let providers = build_providers(&config, &target)?;
    let combined = CombinedProvider::new(providers, config.providers.clone())?;

    status(
        "Resolving",
        &format!("{} requirements for {target}", roots.len()),
    );
    let pb = spinner("Resolving dependencies...");
    let resolved = Resolver::new(&combined, &target, ResolveOptions::from(&config.resolver))
        .resolve(&roots);
    pb.finish_and_clear();

    let (packages, summary) = finalize(resolved?)?;
    if summary.removed_edges > 0 {
        status_warn(
            "Cycles",
            &format!("removed {} circular dependencies", summary.removed_edges),
        );
    }
    status(
        "Resolved",
        &format!("{} packages", summary.module_count),
    );

    let json = serde_json::to_string_pretty(&packages).map_err(PynixError::Json)?;
    if let Some(path) = output {
        std::fs::write(path, format!("{json}\n")).map_err(PynixError::Io)?;
        status_info("Wrote", &path.display().to_string());
    }
    if tree {
        print!("{}", print_tree(&packages));
    } else if output.is_none() {
        println!("{json}");
    }
    Ok(())
}

/// The explicit config file, else `./pynix.toml` when present, else
/// built-in defaults.
fn load_config(path: Option<&Path>) -> PynixResult<ResolveConfig> {
    if let Some(path) = path {
        return ResolveConfig::load(path);
    }
    let local = Path::new(CONFIG_FILE);
    if local.is_file() {
        return ResolveConfig::load(local);
    }
    tracing::debug!("no {CONFIG_FILE} found, using defaults");
    Ok(ResolveConfig::default())
}

fn collect_requirements(file: Option<&Path>, reqs: &[String]) -> PynixResult<Vec<Requirement>> {
    let mut roots = Vec::new();
    if let Some(file) = file {
        let text = std::fs::read_to_string(file).map_err(|e| PynixError::Config {
            message: format!("cannot read {}: {e}", file.display()),
        })?;
        roots.extend(parse_requirements(&text)?);
    }
    for line in reqs {
        roots.push(Requirement::parse(line)?);
    }
    Ok(roots)
}

/// Register a provider for every data source the configuration points at.
fn build_providers(
    config: &ResolveConfig,
    target: &Target,
) -> PynixResult<Vec<Rc<dyn DependencyProvider>>> {
    let mut providers: Vec<Rc<dyn DependencyProvider>> = Vec::new();
    let data = &config.data;

    let mut wheel: Option<Rc<dyn DependencyProvider>> = None;
    let mut sdist: Option<Rc<dyn DependencyProvider>> = None;
    if let Some(db) = &data.pypi_deps_db {
        let wheel_dir = db.join("wheel");
        if wheel_dir.is_dir() {
            let store = BucketStore::open(&wheel_dir)?;
            wheel = Some(Rc::new(WheelProvider::new(Box::new(store), target)?));
        } else {
            tracing::warn!("{} missing, wheel provider disabled", wheel_dir.display());
        }
        let sdist_dir = db.join("sdist");
        if sdist_dir.is_dir() {
            let store = BucketStore::open(&sdist_dir)?;
            sdist = Some(Rc::new(SdistProvider::new(Box::new(store), target)));
        } else {
            tracing::warn!("{} missing, sdist provider disabled", sdist_dir.display());
        }
    }

    if let Some(path) = &data.nixpkgs_json {
        let index = Arc::new(NixpkgsIndex::load(path)?);
        // Packaged releases borrow metadata from sdist before wheel.
        let fallbacks = sdist.iter().chain(wheel.iter()).cloned().collect();
        providers.push(Rc::new(NixpkgsProvider::new(index, fallbacks, target)));
    }
    providers.extend(wheel);
    providers.extend(sdist);

    for (name, files) in &data.conda_channels {
        let channel = CondaChannel::load(name, files)?;
        providers.push(Rc::new(CondaProvider::new(channel, target)));
    }

    if !config.platform.is_empty() {
        providers.push(Rc::new(PlatformProvider::new(&config.platform)));
    }

    let kinds: Vec<String> = providers.iter().map(|p| p.kind().to_string()).collect();
    tracing::debug!("registered providers: {}", kinds.join(", "));
    Ok(providers)
}
