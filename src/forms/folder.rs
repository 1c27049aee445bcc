use serde::{Deserialize, Serialize};
use serde_valid::Validate;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct FolderForm {
    #[validate(min_length = 1)]
    #[validate(max_length = 255)]
    pub name: String,
}
