//! Shadow projector registration and propagation

use super::{
    cell_shadow_heads, renderable_shadow_heads, shadow_cell_heads, shadow_renderable_heads, CellVisibilitySystem,
};
use crate::scene::shadow::{ClientShadowId, ShadowFlags, ShadowHandle, ShadowRecord};
use crate::spatial::{CellId, EntryId};

impl CellVisibilitySystem {
    /// Register a shadow projector owned by the shadow manager
    pub fn register_shadow(&mut self, client_shadow: ClientShadowId, flags: ShadowFlags) -> ShadowHandle {
        self.shadows.insert(ShadowRecord::new(client_shadow, flags))
    }

    /// Remove a projector and every relation it has
    pub fn unregister_shadow(&mut self, handle: ShadowHandle) {
        if !self.shadows.contains_key(handle) {
            return;
        }
        self.remove_shadow_from_cells(handle);
        self.remove_shadow_from_renderables(handle);
        self.shadows.remove(handle);
    }

    /// Record of a registered shadow
    pub fn shadow(&self, handle: ShadowHandle) -> Option<&ShadowRecord> {
        self.shadows.get(handle)
    }

    /// Replace a blob shadow's cell set
    ///
    /// Plain shadows reach the renderables in those cells only when
    /// `shadows_on_renderables` is set.
    pub fn project_shadow(&mut self, handle: ShadowHandle, cells: &[CellId]) {
        if let Some(info) = self.shadows.get(handle) {
            debug_assert_eq!(
                info.flags & ShadowFlags::PROJECTED_TEXTURE_TYPE_MASK,
                ShadowFlags::SHADOW,
                "project_shadow used for a non-shadow projector"
            );
            self.project(handle, cells, false);
        }
    }

    /// Replace a flashlight or projected texture's cell set
    pub fn project_flashlight(&mut self, handle: ShadowHandle, cells: &[CellId]) {
        if let Some(info) = self.shadows.get(handle) {
            debug_assert!(
                info.flags.intersects(ShadowFlags::PROJECTED_TEXTURE_TYPE_MASK),
                "project_flashlight used for a projector without a texture kind"
            );
            self.project(handle, cells, true);
        }
    }

    fn project(&mut self, handle: ShadowHandle, cells: &[CellId], flashlight: bool) {
        self.remove_shadow_from_cells(handle);
        self.remove_shadow_from_renderables(handle);

        let enumeration = self.next_enumeration();
        for &cell in cells {
            self.add_shadow_to_cell(cell, handle, flashlight, enumeration);
        }
    }

    fn add_shadow_to_cell(&mut self, cell: CellId, shadow: ShadowHandle, flashlight: bool, enumeration: u32) {
        self.cell_shadows.add_pair(
            &mut cell_shadow_heads(&mut self.cells),
            &mut shadow_cell_heads(&mut self.shadows),
            cell,
            shadow,
        );
        if !(flashlight || self.config.shadows_on_renderables) {
            return;
        }

        // Each renderable gets the shadow once even if it spans several listed cells
        let mut entry = self.cells.get(cell).map_or(EntryId::INVALID, |c| c.renderable_head);
        while let Some(renderable) = self.cell_renderables.element(entry) {
            entry = self.cell_renderables.next_in_bucket(entry);

            let Some(record) = self.renderables.get_mut(renderable) else {
                continue;
            };
            if record.enum_count == enumeration {
                continue;
            }
            record.enum_count = enumeration;
            self.add_shadow_to_renderable(renderable, shadow);
        }
    }

    fn remove_shadow_from_cells(&mut self, handle: ShadowHandle) {
        self.cell_shadows.remove_element(
            &mut cell_shadow_heads(&mut self.cells),
            &mut shadow_cell_heads(&mut self.shadows),
            handle,
        );
    }

    fn remove_shadow_from_renderables(&mut self, handle: ShadowHandle) {
        self.renderable_shadows.remove_element(
            &mut renderable_shadow_heads(&mut self.renderables),
            &mut shadow_renderable_heads(&mut self.shadows),
            handle,
        );
    }

    /// Shadow manager ids of every projector touching `cells`, each once
    pub fn enumerate_shadows_in_cells(&mut self, cells: &[CellId]) -> Vec<ClientShadowId> {
        let mut found = Vec::new();
        if cells.is_empty() {
            return found;
        }

        let enumeration = self.next_enumeration();
        for &cell in cells {
            let mut entry = self.cells.get(cell).map_or(EntryId::INVALID, |c| c.shadow_head);
            while let Some(shadow) = self.cell_shadows.element(entry) {
                entry = self.cell_shadows.next_in_bucket(entry);
                if let Some(info) = self.shadows.get_mut(shadow) {
                    if info.enum_count != enumeration {
                        info.enum_count = enumeration;
                        found.push(info.client_shadow);
                    }
                }
            }
        }
        found
    }
}
