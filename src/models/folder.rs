use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Conversation;

pub const USER_CREATED: &str = "user_created";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    pub id: i32,
    pub user_id: String,
    pub name: String,
    pub kind: String,
    pub created_at: DateTime<Utc>,
}

/// Sidebar grouping: a folder with the conversations filed under it.
/// Conversations without a folder are collected under `folder: None`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderGroup {
    pub folder: Option<Folder>,
    pub conversations: Vec<Conversation>,
}

pub fn group_by_folder(folders: Vec<Folder>, conversations: Vec<Conversation>) -> Vec<FolderGroup> {
    let mut groups: Vec<FolderGroup> = folders
        .into_iter()
        .map(|folder| FolderGroup {
            folder: Some(folder),
            conversations: vec![],
        })
        .collect();
    let mut unfiled = vec![];

    for conv in conversations {
        let slot = conv.folder_id.and_then(|fid| {
            groups
                .iter_mut()
                .find(|g| g.folder.as_ref().map(|f| f.id) == Some(fid))
        });
        match slot {
            Some(group) => group.conversations.push(conv),
            None => unfiled.push(conv),
        }
    }

    if !unfiled.is_empty() {
        groups.push(FolderGroup {
            folder: None,
            conversations: unfiled,
        });
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn folder(id: i32) -> Folder {
        Folder {
            id,
            user_id: "u".into(),
            name: format!("f{id}"),
            kind: USER_CREATED.into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn conversations_land_in_their_folder_or_unfiled() {
        let a = Conversation::new(None, "u".into(), Some("a".into()), Some(1), None);
        let b = Conversation::new(None, "u".into(), Some("b".into()), None, None);
        let c = Conversation::new(None, "u".into(), Some("c".into()), Some(99), None);

        let groups = group_by_folder(vec![folder(1), folder(2)], vec![a, b, c]);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].conversations.len(), 1);
        assert!(groups[1].conversations.is_empty());
        assert!(groups[2].folder.is_none());
        assert_eq!(groups[2].conversations.len(), 2);
    }
}
