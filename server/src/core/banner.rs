//! Startup banner and view catalog display

use super::config::AppConfig;
use super::constants::APP_NAME;
use crate::domain::views::SchemaRegistry;

// Label width: "Consumer group:" is 15 chars, pad to 17 for alignment
const W: usize = 17;

/// Print the startup banner with the resolved pipeline
pub fn print_banner(config: &AppConfig, topics_backend: &str, sink_name: &str) {
    println!();
    println!(
        "  \x1b[1m\x1b[36m{}\x1b[0m \x1b[90mv{}\x1b[0m",
        APP_NAME,
        env!("CARGO_PKG_VERSION")
    );
    println!();

    let input = match &config.input_path {
        Some(path) => format!("{} \x1b[90m(replaying {})\x1b[0m", config.pipeline.input_topic, path.display()),
        None => config.pipeline.input_topic.clone(),
    };
    println!("  \x1b[32m➜\x1b[0m  \x1b[1m{:<W$}\x1b[0m {}", "Input:", input);
    println!(
        "  \x1b[32m➜\x1b[0m  \x1b[1m{:<W$}\x1b[0m {} \x1b[90m({} partitions, {})\x1b[0m",
        "Consumer group:", config.pipeline.consumer_group, config.pipeline.partitions, topics_backend
    );

    let output = match &config.output_dir {
        Some(dir) => format!("{} \x1b[90m({})\x1b[0m", sink_name, dir.display()),
        None => sink_name.to_string(),
    };
    println!("  \x1b[33m➜\x1b[0m  \x1b[1m{:<W$}\x1b[0m {}", "Output:", output);

    for (view_type, channel) in &config.views {
        println!(
            "  \x1b[35m➜\x1b[0m  \x1b[1m{:<W$}\x1b[0m {}",
            format!("{}:", view_type),
            channel
        );
    }
    println!();
}

/// Print every enabled view schema with its channel and fields
pub fn print_views(registry: &SchemaRegistry) {
    println!();
    for schema in registry.iter() {
        println!(
            "  \x1b[1m{}\x1b[0m \x1b[90mv{} ({})\x1b[0m  ➜  {}",
            schema.name, schema.version, schema.view_type, schema.channel
        );
        println!("    \x1b[90m{}\x1b[0m", schema.fields.join(", "));
    }
    println!();
}
