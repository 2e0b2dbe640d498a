//! Cluster client construction.
//!
//! An explicitly configured kubeconfig path wins; otherwise the client is
//! inferred from the environment (in-cluster service account or the
//! default kubeconfig). Failure here is the only fatal error in the
//! process.

use anyhow::{Context, Result};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::Client;
use tracing::info;

pub async fn client(kubeconfig: Option<&str>) -> Result<Client> {
    let config = match kubeconfig {
        Some(path) => {
            info!(path, "using configured kubeconfig");
            let kubeconfig = Kubeconfig::read_from(path)
                .with_context(|| format!("failed to read kubeconfig at {path}"))?;
            kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .context("failed to build client config from kubeconfig")?
        }
        None => kube::Config::infer()
            .await
            .context("failed to infer cluster client config")?,
    };

    Client::try_from(config).context("failed to construct cluster client")
}
