//! Closed catalog of event types and the domains that own them.
//!
//! Every known `event_type` string maps to exactly one [`EventKind`], and every
//! kind belongs to exactly one [`Domain`]. The mapping is generated from a
//! single table so the string tags, the enum and the domain routing can never
//! drift apart.

use std::fmt;

/// Reducer domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Domain {
    Status,
    Lifecycle,
    MissionAudit,
    DecisionPoint,
    Connector,
    Sync,
    MissionNext,
    Collaboration,
    Glossary,
}

impl Domain {
    pub const ALL: &'static [Domain] = &[
        Domain::Status,
        Domain::Lifecycle,
        Domain::MissionAudit,
        Domain::DecisionPoint,
        Domain::Connector,
        Domain::Sync,
        Domain::MissionNext,
        Domain::Collaboration,
        Domain::Glossary,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Domain::Status => "status",
            Domain::Lifecycle => "lifecycle",
            Domain::MissionAudit => "mission_audit",
            Domain::DecisionPoint => "decision_point",
            Domain::Connector => "connector",
            Domain::Sync => "sync",
            Domain::MissionNext => "mission_next",
            Domain::Collaboration => "collaboration",
            Domain::Glossary => "glossary",
        }
    }

    /// Parse a domain name; accepts `-` in place of `_`.
    pub fn parse(name: &str) -> Option<Self> {
        let normalized = name.trim().to_ascii_lowercase().replace('-', "_");
        Domain::ALL
            .iter()
            .copied()
            .find(|domain| domain.as_str() == normalized)
    }

    /// Event-type prefixes this domain owns.
    const fn prefixes(&self) -> &'static [&'static str] {
        match self {
            Domain::Status => &["WPStatus"],
            Domain::Lifecycle => &["Mission", "Phase"],
            Domain::MissionAudit => &["MissionAudit"],
            Domain::DecisionPoint => &["DecisionPoint"],
            Domain::Connector => &["Connector"],
            Domain::Sync => &["Sync"],
            Domain::MissionNext => &["MissionRun", "NextStep", "DecisionInput"],
            Domain::Collaboration => &[
                "Participant",
                "DriveIntent",
                "Focus",
                "Comment",
                "Warning",
            ],
            Domain::Glossary => &[
                "Glossary",
                "TermCandidate",
                "SemanticCheck",
                "GenerationBlocked",
            ],
        }
    }

    /// The domain owning an event-type string, by longest matching prefix.
    ///
    /// Used to attribute unrecognized event types to a domain stream; known
    /// types should be routed through [`EventKind::domain`] instead.
    pub fn claiming(event_type: &str) -> Option<Domain> {
        Domain::ALL
            .iter()
            .flat_map(|domain| {
                domain
                    .prefixes()
                    .iter()
                    .filter(|prefix| event_type.starts_with(**prefix))
                    .map(move |prefix| (prefix.len(), *domain))
            })
            .max_by_key(|(len, _)| *len)
            .map(|(_, domain)| domain)
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

macro_rules! event_catalog {
    ($( $domain:ident => [ $( $variant:ident = $name:literal ),+ $(,)? ] ),+ $(,)?) => {
        /// Every event type known to the catalog.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum EventKind {
            $( $( $variant, )+ )+
        }

        impl EventKind {
            pub const ALL: &'static [EventKind] = &[ $( $( EventKind::$variant, )+ )+ ];

            /// The wire tag carried in `Event::event_type`.
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $( $( EventKind::$variant => $name, )+ )+
                }
            }

            /// Look up a wire tag. Unknown tags return `None`.
            pub fn parse(event_type: &str) -> Option<Self> {
                match event_type {
                    $( $( $name => Some(EventKind::$variant), )+ )+
                    _ => None,
                }
            }

            pub const fn domain(&self) -> Domain {
                match self {
                    $( $( EventKind::$variant => Domain::$domain, )+ )+
                }
            }
        }
    };
}

event_catalog! {
    Status => [
        WpStatusChanged = "WPStatusChanged",
    ],
    Lifecycle => [
        MissionCreated = "MissionCreated",
        MissionStarted = "MissionStarted",
        PhaseEntered = "PhaseEntered",
        MissionPaused = "MissionPaused",
        MissionResumed = "MissionResumed",
        MissionCompleted = "MissionCompleted",
        MissionCancelled = "MissionCancelled",
    ],
    MissionAudit => [
        MissionAuditRequested = "MissionAuditRequested",
        MissionAuditStarted = "MissionAuditStarted",
        MissionAuditDecisionRequested = "MissionAuditDecisionRequested",
        MissionAuditCompleted = "MissionAuditCompleted",
        MissionAuditFailed = "MissionAuditFailed",
    ],
    DecisionPoint => [
        DecisionPointOpened = "DecisionPointOpened",
        DecisionPointDiscussing = "DecisionPointDiscussing",
        DecisionPointResolved = "DecisionPointResolved",
        DecisionPointOverridden = "DecisionPointOverridden",
    ],
    Connector => [
        ConnectorProvisioned = "ConnectorProvisioned",
        ConnectorHealthChecked = "ConnectorHealthChecked",
        ConnectorDegraded = "ConnectorDegraded",
        ConnectorRecovered = "ConnectorRecovered",
        ConnectorRevoked = "ConnectorRevoked",
        ConnectorDecommissioned = "ConnectorDecommissioned",
    ],
    Sync => [
        SyncIngestAccepted = "SyncIngestAccepted",
        SyncIngestRejected = "SyncIngestRejected",
        SyncRetryScheduled = "SyncRetryScheduled",
        SyncDeadLettered = "SyncDeadLettered",
    ],
    MissionNext => [
        MissionRunStarted = "MissionRunStarted",
        NextStepIssued = "NextStepIssued",
        NextStepAutoCompleted = "NextStepAutoCompleted",
        DecisionInputRequested = "DecisionInputRequested",
        DecisionInputAnswered = "DecisionInputAnswered",
        MissionRunCompleted = "MissionRunCompleted",
    ],
    Collaboration => [
        ParticipantInvited = "ParticipantInvited",
        ParticipantJoined = "ParticipantJoined",
        ParticipantLeft = "ParticipantLeft",
        DriveIntentSet = "DriveIntentSet",
        FocusChanged = "FocusChanged",
        CommentPosted = "CommentPosted",
        WarningRaised = "WarningRaised",
        WarningAcknowledged = "WarningAcknowledged",
    ],
    Glossary => [
        GlossaryScopeActivated = "GlossaryScopeActivated",
        GlossaryStrictnessSet = "GlossaryStrictnessSet",
        TermCandidateObserved = "TermCandidateObserved",
        GlossarySenseUpdated = "GlossarySenseUpdated",
        GlossaryClarificationRequested = "GlossaryClarificationRequested",
        GlossaryClarificationResolved = "GlossaryClarificationResolved",
        SemanticCheckEvaluated = "SemanticCheckEvaluated",
        GenerationBlockedBySemanticConflict = "GenerationBlockedBySemanticConflict",
    ],
}

impl EventKind {
    /// All kinds owned by one domain, in catalog order.
    pub fn of_domain(domain: Domain) -> impl Iterator<Item = EventKind> {
        EventKind::ALL
            .iter()
            .copied()
            .filter(move |kind| kind.domain() == domain)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_roundtrips_every_tag() {
        for kind in EventKind::ALL {
            assert_eq!(EventKind::parse(kind.as_str()), Some(*kind));
        }
    }

    #[test]
    fn test_unknown_tag_is_none() {
        assert_eq!(EventKind::parse("WPStatusExploded"), None);
        assert_eq!(EventKind::parse(""), None);
    }

    #[test]
    fn test_every_domain_owns_at_least_one_kind() {
        for domain in Domain::ALL {
            assert!(EventKind::of_domain(*domain).count() > 0, "{domain} is empty");
        }
    }

    #[test]
    fn test_known_kinds_are_claimed_by_their_own_domain() {
        for kind in EventKind::ALL {
            assert_eq!(
                Domain::claiming(kind.as_str()),
                Some(kind.domain()),
                "{kind} claimed by the wrong domain"
            );
        }
    }

    #[test]
    fn test_longest_prefix_wins() {
        assert_eq!(
            Domain::claiming("MissionAuditEscalated"),
            Some(Domain::MissionAudit)
        );
        assert_eq!(Domain::claiming("MissionRunAborted"), Some(Domain::MissionNext));
        assert_eq!(Domain::claiming("MissionArchived"), Some(Domain::Lifecycle));
        assert_eq!(Domain::claiming("SomethingElse"), None);
    }

    #[test]
    fn test_domain_parse() {
        assert_eq!(Domain::parse("mission-audit"), Some(Domain::MissionAudit));
        assert_eq!(Domain::parse("STATUS"), Some(Domain::Status));
        assert_eq!(Domain::parse("unknown"), None);
    }
}
