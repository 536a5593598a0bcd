pub mod error;
pub mod params;
pub mod registrar;
pub mod niftyreg;
pub mod stage;

pub use error::{RegistrationError, Result};
pub use params::{SmoothnessLevel, DeformableParams, DEFAULT_JACOBIAN_PENALTY};
pub use registrar::{Registrar, RegistrationRequest, AffineOutput, DeformableOutput};
pub use niftyreg::NiftyReg;
pub use stage::RegistrationStage;
