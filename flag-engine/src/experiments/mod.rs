pub mod experiment_assignment;
pub mod experiment_models;

#[cfg(test)]
mod test_experiment_assignment;
