use clap::Parser;

use kg_atlas::app::{AtlasApp, AtlasConfig};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Base URL of the knowledge-graph service. Without it the built-in
    /// sample graph is explored offline.
    #[arg(long)]
    service_url: Option<String>,

    /// Entity id to center the initial neighborhood fetch on.
    #[arg(long)]
    focus: Option<String>,

    /// Traversal depth for neighborhood fetches; 0 fetches just the focus
    /// node.
    #[arg(long, default_value_t = 2)]
    depth: u32,

    /// Upper bound on nodes kept from any single fetch.
    #[arg(long, default_value_t = 150)]
    limit: usize,
}

fn main() -> eframe::Result<()> {
    env_logger::init();

    let args = Args::parse();
    let config = AtlasConfig {
        service_url: args.service_url,
        focus: args.focus,
        depth: args.depth,
        limit: args.limit.max(1),
    };

    let options = eframe::NativeOptions {
        viewport: eframe::egui::ViewportBuilder::default().with_inner_size([1440.0, 920.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Knowledge Atlas",
        options,
        Box::new(move |cc| Ok(Box::new(AtlasApp::new(cc, config.clone())))),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_zero_deep_link_is_accepted() {
        let args = Args::try_parse_from(["kg-atlas", "--focus", "TensorFlow", "--depth", "0"])
            .expect("parse");
        assert_eq!(args.depth, 0);
        assert_eq!(args.focus.as_deref(), Some("TensorFlow"));
    }
}
