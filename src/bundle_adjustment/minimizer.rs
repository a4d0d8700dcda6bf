use levenberg_marquardt::LevenbergMarquardt;

use super::problem::ReprojectionProblem;
use crate::config::TriangulationOptions;

#[derive(Debug, Clone)]
pub struct MinimizerReport {
    pub converged: bool,
    pub evaluations: usize,
    /// Final value of half the squared residual norm.
    pub objective: f64,
    pub termination: String,
}

/// Nonlinear least-squares engine used by the bundle adjustment.
pub trait Minimizer {
    fn minimize(&self, problem: ReprojectionProblem) -> (ReprojectionProblem, MinimizerReport);
}

#[derive(Debug, Clone, Default)]
pub struct LevenbergMarquardtMinimizer {
    /// At most `patience * (parameters + 1)` evaluations, `None` for the
    /// engine default.
    pub patience: Option<usize>,
}

impl LevenbergMarquardtMinimizer {
    pub fn from_options(options: &TriangulationOptions) -> Self {
        Self {
            patience: (options.ba_patience > 0).then_some(options.ba_patience),
        }
    }
}

impl Minimizer for LevenbergMarquardtMinimizer {
    fn minimize(&self, problem: ReprojectionProblem) -> (ReprojectionProblem, MinimizerReport) {
        let mut levenberg_marquardt = LevenbergMarquardt::new();
        if let Some(patience) = self.patience {
            levenberg_marquardt = levenberg_marquardt.with_patience(patience);
        }
        let (problem, report) = levenberg_marquardt.minimize(problem);
        log::info!(
            "Levenberg-Marquardt terminated with reason {:?} after {} evaluations",
            report.termination,
            report.number_of_evaluations
        );
        let report = MinimizerReport {
            converged: report.termination.was_successful(),
            evaluations: report.number_of_evaluations,
            objective: report.objective_function,
            termination: format!("{:?}", report.termination),
        };
        (problem, report)
    }
}
