#[path = "property/determinism.rs"]
mod determinism;

#[path = "property/token_normalisation.rs"]
mod token_normalisation;

#[path = "property/refusal_evidence.rs"]
mod refusal_evidence;
