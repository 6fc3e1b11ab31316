#[path = "e2e/surf_pipeline.rs"]
mod surf_pipeline;

#[path = "e2e/tracks.rs"]
mod tracks;

#[path = "e2e/verification.rs"]
mod verification;

#[path = "e2e/configured_runs.rs"]
mod configured_runs;
