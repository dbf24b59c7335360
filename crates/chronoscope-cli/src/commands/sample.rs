//! Sample command - Profile a built-in demo object graph.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;

use chronoscope::chronoscope_core::collect_iter;
use chronoscope::prelude::*;

use crate::OutputFormat;

/// Arguments for the sample command.
#[derive(Args)]
pub struct SampleArgs {
    /// Number of passes over the demo workload
    #[arg(short = 'n', long, default_value = "3")]
    pub iterations: usize,

    /// Resolve measures lazily
    #[arg(long)]
    pub lazy: bool,

    /// Log every completed call (shown with -vv)
    #[arg(long)]
    pub log_calls: bool,

    /// Write the raw measurements as JSON to this file
    #[arg(long)]
    pub export: Option<PathBuf>,
}

/// Execute the sample command.
pub fn execute(args: SampleArgs, config: Option<&Path>, format: OutputFormat) -> Result<()> {
    let mut builder = Chronoscope::builder().with_root_path("catalog");
    if let Some(path) = config {
        builder = builder
            .with_config_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?;
    }
    if args.lazy {
        builder = builder.with_eval_mode(EvalMode::Lazy);
    }
    if args.log_calls {
        builder = builder.with_logging();
    }
    let profiler = builder.build().context("Failed to create profiler")?;

    let catalog = profiler.wrap(demo_catalog());
    for pass in 0..args.iterations {
        tracing::debug!(pass, "Running demo workload");
        run_workload(&catalog).map_err(|e| anyhow::anyhow!("Demo workload threw: {}", e))?;
    }

    if let Some(path) = &args.export {
        let json = profiler.export_json()?;
        std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::info!(path = %path.display(), "Measurements exported");
    }

    let report = profiler.report();
    match format {
        OutputFormat::Human => print!("{}", report.to_text()),
        OutputFormat::Json => println!("{}", report.to_json_pretty()),
        OutputFormat::JsonCompact => println!("{}", serde_json::to_string(&report.to_json())?),
    }
    Ok(())
}

fn run_workload(catalog: &Value) -> Result<(), Thrown> {
    let products = catalog.get("products")?;

    for product in collect_iter(&products.call_method("list", &[])?)? {
        product.call_method("price", &[])?;
    }

    let product = products.call_method("find", &[Value::from(2)])?;
    product.call_method("discounted", &[Value::from(10)])?;

    catalog.call_method("restock", &[])?;
    catalog.get("index")?.call_method("get", &["sku-1".into()])?;
    Ok(())
}

fn work(micros: u64) {
    std::thread::sleep(Duration::from_micros(micros));
}

fn product(id: usize, price: f64) -> Value {
    PlainObject::new()
        .with("id", Value::from(id))
        .with("sku", Value::from(format!("sku-{}", id)))
        .with("price", Value::function("price", move |_, _| {
            work(50);
            Ok(Value::Number(price))
        }))
        .with("discounted", Value::function("discounted", |this, args| {
            let base = this.call_method("price", &[])?.as_number().unwrap_or(0.0);
            let pct = arg(args, 0).as_number().unwrap_or(0.0);
            Ok(Value::Number(base * (100.0 - pct) / 100.0))
        }))
        .into_value()
}

fn demo_catalog() -> Value {
    let index = MapObject::new();
    index.insert("sku-1".into(), Value::from(1));
    index.insert("sku-2".into(), Value::from(2));

    let products = PlainObject::new()
        .with("list", Value::function("list", |_, _| {
            work(200);
            Ok(Value::object(ArrayObject::from_values([
                product(1, 9.5),
                product(2, 20.0),
                product(3, 4.25),
            ])))
        }))
        .with("find", Value::function("find", |_, args| {
            work(100);
            let id = arg(args, 0).as_number().unwrap_or(0.0) as usize;
            Ok(product(id, id as f64 * 10.0))
        }))
        .into_value();

    PlainObject::new()
        .with("products", products)
        .with("index", Value::object(index))
        .with_constant("version", Value::from("1.0.0"))
        .with("restock", Value::function("restock", |_, _| {
            work(150);
            Ok(Value::deferred(Deferred::resolved(true)))
        }))
        .into_value()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_workload_measures_every_layer() {
        let profiler = Chronoscope::builder()
            .with_root_path("catalog")
            .with_clock(Arc::new(ManualClock::new()))
            .build()
            .unwrap();
        let catalog = profiler.wrap(demo_catalog());

        run_workload(&catalog).unwrap();

        let names: Vec<String> = profiler.measurements().into_iter().map(|m| m.name).collect();
        assert!(names.contains(&"catalog.products.list".to_string()));
        assert!(names.contains(&"catalog.products.list.@@iterator.next".to_string()));
        assert!(names.contains(&"catalog.products.find.discounted".to_string()));
        assert!(names.contains(&"catalog.products.find.price".to_string()));
        assert!(names.contains(&"catalog.restock".to_string()));
        assert!(!names.iter().any(|n| n.starts_with("catalog.index")));
        assert_eq!(profiler.cache_len(), 0);
    }
}
