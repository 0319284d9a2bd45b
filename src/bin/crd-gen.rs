use kube::CustomResourceExt;
use portti::crd::controlplane::ControlPlane;
use portti::crd::dataplane::DataPlane;

fn main() -> anyhow::Result<()> {
    // Emit both CRDs as JSON (kubectl accepts JSON); one document each,
    // newline separated
    let dataplane = serde_json::to_string_pretty(&DataPlane::crd())?;
    let controlplane = serde_json::to_string_pretty(&ControlPlane::crd())?;
    println!("{}", dataplane);
    println!("{}", controlplane);
    Ok(())
}
