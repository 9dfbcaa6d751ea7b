//! Entity implementation

slotmap::new_key_type! {
    /// Entity identifier
    ///
    /// Generational key: a handle to a despawned entity never aliases a
    /// later one occupying the same slot.
    pub struct Entity;
}
