//! slot-render - render a view/frame/layout chain and print the response

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quarto_slot::{
    Chain, ChainConfig, ResponseRecorder, SlotError, Slots, Stage, Strategy, TracingObserver,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StrategyArg {
    Sequential,
    Concurrent,
}

impl From<StrategyArg> for Strategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Sequential => Strategy::Sequential,
            StrategyArg::Concurrent => Strategy::Concurrent,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "slot-render")]
#[command(about = "Render a view inside a frame inside a layout")]
struct Args {
    /// Chain configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Execution strategy (overrides the config file)
    #[arg(short, long, value_enum)]
    strategy: Option<StrategyArg>,

    /// Heading rendered by the view
    #[arg(long, default_value = "Hello")]
    title: String,
}

struct View {
    title: String,
}

#[async_trait]
impl Stage for View {
    fn name(&self) -> &str {
        "view"
    }

    async fn run(&self, slots: &mut dyn Slots) -> Result<(), SlotError> {
        slots.set_header("Content-Type", "text/html");
        slots.write_named("script", "<script src='/index.js'></script>");
        let inner = slots.read_main().await?;
        slots.write_main(&format!("<h1>{}{}</h1>", self.title, inner));
        Ok(())
    }
}

struct Frame;

#[async_trait]
impl Stage for Frame {
    fn name(&self) -> &str {
        "frame"
    }

    async fn run(&self, slots: &mut dyn Slots) -> Result<(), SlotError> {
        let inner = slots.read_main().await?;
        slots.write_named("style", "<link href='/frame.css'/>");
        slots.write_main(&format!("<main>\n\t\t\t{inner}\n\t\t</main>"));
        Ok(())
    }
}

struct Layout;

#[async_trait]
impl Stage for Layout {
    fn name(&self) -> &str {
        "layout"
    }

    async fn run(&self, slots: &mut dyn Slots) -> Result<(), SlotError> {
        let inner = slots.read_main().await?;
        let script = slots.read_named("script").await?;
        let style = slots.read_named("style").await?;
        slots.write_main(&format!(
            "<html>\n\t<head>\n\t\t{script}\n\t\t{style}\n\t</head>\n\t<body>\n\t\t{inner}\n\t</body>\n</html>"
        ));
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quarto_slot=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => {
            let source = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            ChainConfig::from_toml_str(&source)?
        }
        None => ChainConfig::default(),
    };
    if let Some(strategy) = args.strategy {
        config.strategy = strategy.into();
    }

    info!(strategy = %config.strategy, "Rendering");

    let stages: Vec<Arc<dyn Stage>> = vec![
        Arc::new(View { title: args.title }),
        Arc::new(Frame),
        Arc::new(Layout),
    ];
    let chain = Chain::new(stages)
        .with_config(&config)
        .with_observer(Arc::new(TracingObserver::new()));

    let sink = Arc::new(ResponseRecorder::new());
    let result = chain.run(b"", sink.clone()).await;

    println!("Status: {}", sink.status());
    for (name, value) in sink.headers().iter() {
        println!("{name}: {value}");
    }
    println!();
    println!("{}", sink.body());

    result?;
    Ok(())
}
