pub mod check_env;
pub mod publish;
pub mod synth;
