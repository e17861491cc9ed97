/// Trainer driving epoch-by-epoch updates of [`predictor::GeneratorWeights`]
pub mod builder;
/// Dense adjacency/border observation tables and the LCV cost function
pub mod connectivity;
/// Neighborhood-conditioned softmax classifier and its weight tensor
pub mod predictor;
/// Backtracking constraint solver with AC-3 establishment and trail-based undo
pub mod solver;
/// `LayeredTile` value type and the ingest-time uniqueness map
pub mod tiles;
