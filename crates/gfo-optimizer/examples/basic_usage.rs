use gfo_optimizer::*;
use std::sync::Arc;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("Gradient-free optimization basic usage");

    // Minimize a shifted paraboloid with a constraint, built in code
    let space = Arc::new(
        SearchSpace::builder()
            .add_int("x", -10, 10)
            .add_float("y", -5.0, 5.0, 101)
            .build()?,
    );
    let constraints = ConstraintSet::new(Arc::clone(&space))
        .with_fn("x + y <= 6", |p: &Parameters| {
            let x = p["x"].as_f64().unwrap_or(0.0);
            let y = p["y"].as_f64().unwrap_or(0.0);
            x + y <= 6.0
        });
    let optimizer = HillClimbing::new(space)
        .with_epsilon(0.1)
        .with_constraints(constraints)
        .with_seed(42);

    let mut driver = SearchDriver::new(optimizer, 100)
        .with_direction(ObjectiveDirection::Minimize)
        .with_early_stopping(EarlyStopping::new(30));
    let result = driver.run(|p| {
        let x = p["x"].as_f64().unwrap_or(0.0);
        let y = p["y"].as_f64().unwrap_or(0.0);
        Ok((x - 3.0).powi(2) + (y - 1.5).powi(2))
    })?;
    println!(
        "Hill climbing: best score {:?} at {:?} after {} trials ({:?})",
        result.best_score(),
        result.best_para(),
        result.n_trials,
        result.stop_reason
    );

    // The same kind of run driven from JSON configuration
    let config = RunConfig::from_json(
        r#"{
            "search_space": [
                {"name": "x", "kind": {"int_range": {"low": -10, "high": 10}}},
                {"name": "y", "kind": {"float_range": {"low": -5.0, "high": 5.0, "resolution": 101}}}
            ],
            "random_state": 7,
            "optimum": "minimum",
            "n_iter": 40,
            "strategy": {"kind": "bayesian_optimization", "xi": 0.01}
        }"#,
    )?;
    let result = config.run(|p| {
        let x = p["x"].as_f64().unwrap_or(0.0);
        let y = p["y"].as_f64().unwrap_or(0.0);
        Ok((x - 3.0).powi(2) + (y - 1.5).powi(2))
    })?;
    println!(
        "Bayesian optimization: best score {:?} after {} objective calls",
        result.best_score(),
        result.n_objective_calls
    );

    Ok(())
}
