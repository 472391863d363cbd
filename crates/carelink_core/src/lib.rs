pub mod accounts;
pub mod codec;
pub mod domain;
pub mod error;
pub mod fields;
pub mod invitations;
pub mod memory;
pub mod ports;
pub mod profiles;
pub mod relationships;
pub mod session;
pub mod survey;
pub mod validation;

pub use accounts::AccountService;
pub use domain::{
    CareTakerQuestions, CaregiverInfo, CaregiverInvitation, InvitationStatus, ProfileDraft,
    Question, QuestionAnswer, QuestionKind, QuestionOption, Role, TestSession, UserProfile,
    UserPublicProfile,
};
pub use error::{AuthErrorKind, CareError, CareResult, WriteStep};
pub use fields::{FieldValue, Fields};
pub use ports::{
    AuthGrant, DocumentStore, IdentityError, IdentityGateway, PortError, PortResult, SecretStore,
};
pub use relationships::{RelationshipEngine, Removal, RepairReport};
pub use session::SessionContext;
pub use survey::{OptionDraft, QuestionDraft, SurveyDraft, SurveyEngine};
