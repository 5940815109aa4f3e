//! Shadow and projected-texture records

use bitflags::bitflags;

use crate::foundation::collections::new_key_type;
use crate::spatial::EntryId;

new_key_type! {
    /// Stable handle to a registered shadow projector
    pub struct ShadowHandle;
}

/// Identifier the shadow manager uses for its own shadow objects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientShadowId(pub u32);

bitflags! {
    /// Kind of projected texture a shadow record represents
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShadowFlags: u16 {
        /// Flashlight projection
        const FLASHLIGHT = 1 << 0;
        /// Render-to-texture blob shadow
        const SHADOW = 1 << 1;
        /// Simple projected texture
        const SIMPLE_PROJECTION = 1 << 2;
        /// Every projected-texture kind
        const PROJECTED_TEXTURE_TYPE_MASK = Self::FLASHLIGHT.bits()
            | Self::SHADOW.bits()
            | Self::SIMPLE_PROJECTION.bits();
    }
}

impl ShadowFlags {
    /// Kinds that still land on renderables when plain shadows do not
    pub const ALWAYS_ON_RENDERABLES: Self = Self::FLASHLIGHT.union(Self::SIMPLE_PROJECTION);
}

/// Bookkeeping for one shadow projector
#[derive(Debug, Clone)]
pub struct ShadowRecord {
    pub(crate) client_shadow: ClientShadowId,
    pub(crate) flags: ShadowFlags,
    /// Last enumeration pass that visited this shadow
    pub(crate) enum_count: u32,
    pub(crate) cell_head: EntryId,
    pub(crate) renderable_head: EntryId,
}

impl ShadowRecord {
    pub(crate) fn new(client_shadow: ClientShadowId, flags: ShadowFlags) -> Self {
        Self {
            client_shadow,
            flags,
            enum_count: 0,
            cell_head: EntryId::INVALID,
            renderable_head: EntryId::INVALID,
        }
    }

    /// Shadow manager id
    pub fn client_shadow(&self) -> ClientShadowId {
        self.client_shadow
    }

    /// Projected texture kind
    pub fn flags(&self) -> ShadowFlags {
        self.flags
    }

    /// Whether this shadow attaches to renderables when plain shadows are off
    pub fn always_on_renderables(&self) -> bool {
        self.flags.intersects(ShadowFlags::ALWAYS_ON_RENDERABLES)
    }
}
