//! Privacy level of a new annotation

use crate::cache::{PrivacyLevel, ShareOpts, UnifiedList};

/// Persisted sharing preferences, as last read from the preference store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SharingPreference {
    pub auto_share: bool,
    /// Per-page default chosen by the user, if any
    pub page_default: Option<PrivacyLevel>,
}

impl SharingPreference {
    fn level(&self) -> PrivacyLevel {
        self.page_default.unwrap_or(if self.auto_share {
            PrivacyLevel::Shared
        } else {
            PrivacyLevel::Private
        })
    }
}

/// Decide the privacy level of a new annotation.
///
/// A selected list decides on its own: shared lists make the annotation
/// shared, local ones keep it private. Without a list an explicit flag
/// wins, in either direction. Only when neither is given do the persisted
/// preferences apply.
pub fn resolve_privacy_level(
    selected_list: Option<&UnifiedList>,
    should_share: Option<bool>,
    preference: &SharingPreference,
) -> PrivacyLevel {
    if let Some(list) = selected_list {
        return if list.is_shared() {
            PrivacyLevel::Shared
        } else {
            PrivacyLevel::Private
        };
    }
    match should_share {
        Some(true) => PrivacyLevel::Shared,
        Some(false) => PrivacyLevel::Private,
        None => preference.level(),
    }
}

/// Flags handed to persistence for a privacy level
pub fn share_opts_for(level: PrivacyLevel) -> ShareOpts {
    ShareOpts {
        should_share: level.is_shared(),
        is_bulk_share_protected: level == PrivacyLevel::Protected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{RemoteId, UnifiedListId};

    fn list(shared: bool) -> UnifiedList {
        UnifiedList {
            unified_id: UnifiedListId::from("0"),
            local_id: Some(1),
            remote_id: shared.then(|| RemoteId::from("remote")),
            name: "list".into(),
            description: None,
            creator: None,
            has_remote_annotations_to_load: false,
            unified_annotation_ids: Vec::new(),
        }
    }

    #[test]
    fn shared_list_beats_explicit_flag_and_preference() {
        let pref = SharingPreference::default();
        assert_eq!(
            resolve_privacy_level(Some(&list(true)), Some(false), &pref),
            PrivacyLevel::Shared
        );
    }

    #[test]
    fn local_list_keeps_annotation_private_despite_auto_share() {
        let pref = SharingPreference {
            auto_share: true,
            page_default: None,
        };
        assert_eq!(
            resolve_privacy_level(Some(&list(false)), Some(true), &pref),
            PrivacyLevel::Private
        );
    }

    #[test]
    fn explicit_no_share_overrides_auto_share() {
        let pref = SharingPreference {
            auto_share: true,
            page_default: Some(PrivacyLevel::Shared),
        };
        assert_eq!(resolve_privacy_level(None, Some(false), &pref), PrivacyLevel::Private);
        assert_eq!(
            resolve_privacy_level(None, Some(true), &SharingPreference::default()),
            PrivacyLevel::Shared
        );
    }

    #[test]
    fn preferences_apply_without_flag_or_list() {
        let auto = SharingPreference {
            auto_share: true,
            page_default: None,
        };
        assert_eq!(resolve_privacy_level(None, None, &auto), PrivacyLevel::Shared);

        let page_private = SharingPreference {
            auto_share: true,
            page_default: Some(PrivacyLevel::Private),
        };
        assert_eq!(resolve_privacy_level(None, None, &page_private), PrivacyLevel::Private);
        assert_eq!(
            resolve_privacy_level(None, None, &SharingPreference::default()),
            PrivacyLevel::Private
        );
    }

    #[test]
    fn share_opts_mirror_level() {
        assert!(share_opts_for(PrivacyLevel::Shared).should_share);
        assert!(share_opts_for(PrivacyLevel::Protected).is_bulk_share_protected);
        assert_eq!(share_opts_for(PrivacyLevel::Private), ShareOpts::default());
    }
}
