use crate::config::Config;
use crate::sidecar::config::SidecarKind;
use crate::sidecar::docker::DockerRuntime;
use crate::sidecar::runtime::ContainerRuntime;

/// Report Docker connectivity and image availability.
pub async fn run_doctor_command(config: &Config) -> anyhow::Result<()> {
    match &config.source {
        Some(path) => println!("Config:  {}", path.display()),
        None => println!("Config:  defaults (no fleet file)"),
    }
    println!("Tenants: {}", config.tenants.len());

    let runtime = DockerRuntime::new();
    if let Err(e) = runtime.ping().await {
        println!("Docker:  unreachable ({e})");
        anyhow::bail!("Docker daemon is not reachable");
    }
    println!("Docker:  reachable");
    println!("Network: {}", config.orchestrator.network_name);

    for kind in SidecarKind::ALL {
        let image = config.orchestrator.image(kind);
        let state = match runtime.image_exists(image).await {
            Ok(true) => "present".to_string(),
            Ok(false) => "missing (pulled on first start)".to_string(),
            Err(e) => format!("unknown ({e})"),
        };
        let ports = config.orchestrator.port_range(kind);
        println!(
            "  {:<13} {} [host {}+, container {}] {}",
            kind.as_str(),
            image,
            ports.start,
            ports.internal,
            state
        );
    }
    Ok(())
}
