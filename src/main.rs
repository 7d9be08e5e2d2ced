use pipegraph::engine::{Pipeline, RunEvent, RunOutcome};

fn demo_config() -> serde_json::Value {
    // readings -> scale -> filter, readings -> select
    serde_json::json!({
        "nodes": [
            {
                "id": "readings",
                "type": "table_source",
                "options": {
                    "columns": [
                        {"name": "sensor", "type": "text", "values": ["a", "b", "c", "d"]},
                        {"name": "celsius", "type": "int", "values": [12, 25, 31, 8]}
                    ],
                    "index": ["sensor"]
                }
            },
            {
                "id": "fraction",
                "type": "scale",
                "options": {"column": "celsius", "factor": 0.01}
            },
            {
                "id": "warm",
                "type": "filter",
                "options": {"column": "celsius", "op": "gt", "value": 0.2}
            },
            {
                "id": "names",
                "type": "select_columns",
                "options": {"columns": ["sensor"]}
            }
        ],
        "connections": [
            {"from": "readings", "to": "fraction"},
            {"from": "fraction", "to": "warm"},
            {"from": "readings", "to": "names"}
        ],
        "pipeline_config": {"max_workers": 2}
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut pipeline = match std::env::args().nth(1) {
        Some(path) => {
            println!("Loading pipeline from {}", path);
            Pipeline::from_file(&path)?
        }
        None => {
            println!("No pipeline file given, running the built-in demo");
            Pipeline::from_json(demo_config())?
        }
    };

    let mut events = pipeline.scheduler().subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                RunEvent::NodeFinished(report) => {
                    let shape = report
                        .output_shape
                        .as_ref()
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| "-".to_string());
                    match &report.error {
                        None => println!("  {} {} -> {} in {:?}", report.node, report.kind, shape, report.latency),
                        Some(e) => println!("  {} {} failed: {}", report.node, report.kind, e),
                    }
                    if let Some(diff) = report.shape_diff.as_ref().filter(|d| !d.is_empty()) {
                        println!("    shape change: {:?}", diff);
                    }
                }
                RunEvent::Completed | RunEvent::Aborted { .. } => break,
                _ => {}
            }
        }
    });

    let summary = pipeline.execute().await?;
    let _ = printer.await;

    match &summary.outcome {
        RunOutcome::Completed => println!("\nRun completed in {:?}", summary.duration),
        RunOutcome::Aborted { node, error } => println!("\nRun aborted at {}: {}", node, error),
    }

    for (label, id) in pipeline.labels() {
        if let Some(frame) = summary.outputs.get(id) {
            println!("\n[{}] {} rows", label, frame.num_rows());
            for column in frame.summary().columns {
                println!("  {:?}", column);
            }
        }
    }

    println!("\n{}", pipeline.scheduler().get_monitor().generate_report());
    Ok(())
}
