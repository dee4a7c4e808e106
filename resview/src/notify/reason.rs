//! Change reasons.

use std::fmt;

/// Why resources may have changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Reason {
    /// A resource file was edited and its repository rescanned.
    ResourceEdit,
    /// A file open in an editor changed.
    Edit,
    /// The active configuration (locale, density, ...) changed.
    ConfigurationChanged,
    /// The platform SDK changed.
    SdkChanged,
    /// The build variant changed.
    VariantChanged,
    /// The module graph was re-synchronized with the build system.
    Sync,
    /// A build finished.
    Build,
    /// An image resource changed on disk.
    ImageResourceChanged,
}

impl Reason {
    pub const ALL: [Reason; 8] = [
        Reason::ResourceEdit,
        Reason::Edit,
        Reason::ConfigurationChanged,
        Reason::SdkChanged,
        Reason::VariantChanged,
        Reason::Sync,
        Reason::Build,
        Reason::ImageResourceChanged,
    ];

    fn bit(self) -> u16 {
        1 << (self as u16)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Reason::ResourceEdit => "resource-edit",
            Reason::Edit => "edit",
            Reason::ConfigurationChanged => "configuration-changed",
            Reason::SdkChanged => "sdk-changed",
            Reason::VariantChanged => "variant-changed",
            Reason::Sync => "sync",
            Reason::Build => "build",
            Reason::ImageResourceChanged => "image-resource-changed",
        }
    }

    /// Whether this reason moves the "other" counter of version stamps.
    pub fn bumps_other_generation(&self) -> bool {
        matches!(
            self,
            Reason::Sync | Reason::Build | Reason::VariantChanged | Reason::SdkChanged
        )
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Set of reasons accumulated for one delivery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ReasonSet(u16);

impl ReasonSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn of(reason: Reason) -> Self {
        Self(reason.bit())
    }

    pub fn insert(&mut self, reason: Reason) {
        self.0 |= reason.bit();
    }

    pub fn remove(&mut self, reason: Reason) {
        self.0 &= !reason.bit();
    }

    pub fn union(self, other: ReasonSet) -> Self {
        Self(self.0 | other.0)
    }

    pub fn contains(&self, reason: Reason) -> bool {
        self.0 & reason.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Whether the set is exactly `{reason}`.
    pub fn is_only(&self, reason: Reason) -> bool {
        self.0 == reason.bit()
    }

    /// Whether a listener whose version stamp did not move may be skipped.
    ///
    /// Only a batch made of nothing but [`Reason::ResourceEdit`] qualifies;
    /// any other reason is always delivered.
    pub fn allows_short_circuit(&self) -> bool {
        self.is_only(Reason::ResourceEdit)
    }

    pub fn iter(&self) -> impl Iterator<Item = Reason> + '_ {
        Reason::ALL.into_iter().filter(|r| self.contains(*r))
    }
}

impl FromIterator<Reason> for ReasonSet {
    fn from_iter<I: IntoIterator<Item = Reason>>(iter: I) -> Self {
        let mut set = ReasonSet::empty();
        for reason in iter {
            set.insert(reason);
        }
        set
    }
}

impl From<Reason> for ReasonSet {
    fn from(reason: Reason) -> Self {
        Self::of(reason)
    }
}

impl fmt::Display for ReasonSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(|r| r.name()).collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}
