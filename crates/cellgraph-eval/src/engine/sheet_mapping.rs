use cellgraph_common::SheetId;
use cellgraph_parse::SheetLookup;
use rustc_hash::FxHashMap;

/// Sheet names <-> ids. Lookup is case-insensitive.
///
/// Ids are handed out in order and never reused, so a removed sheet leaves
/// a hole and every other sheet keeps its id.
#[derive(Default, Debug, Clone)]
pub struct SheetMapping {
    id_by_name: FxHashMap<String, SheetId>,
    name_by_id: Vec<Option<String>>,
}

impl SheetMapping {
    pub fn new() -> Self {
        SheetMapping::default()
    }

    /// Register `name`, or return the id it already has.
    pub fn id_for(&mut self, name: &str) -> SheetId {
        if let Some(id) = self.get_id(name) {
            return id;
        }

        let id = self.name_by_id.len() as SheetId;
        self.name_by_id.push(Some(name.to_string()));
        self.id_by_name.insert(name.to_lowercase(), id);
        id
    }

    pub fn name(&self, id: SheetId) -> Option<&str> {
        self.name_by_id.get(id as usize)?.as_deref()
    }

    pub fn get_id(&self, name: &str) -> Option<SheetId> {
        self.id_by_name.get(&name.to_lowercase()).copied()
    }

    pub fn contains(&self, id: SheetId) -> bool {
        self.name(id).is_some()
    }

    /// Give `id` a new name. The caller checks the name is free.
    pub fn rename(&mut self, id: SheetId, name: &str) -> Option<String> {
        let slot = self.name_by_id.get_mut(id as usize)?;
        let old = slot.replace(name.to_string())?;
        self.id_by_name.remove(&old.to_lowercase());
        self.id_by_name.insert(name.to_lowercase(), id);
        Some(old)
    }

    pub fn remove(&mut self, id: SheetId) -> Option<String> {
        let old = self.name_by_id.get_mut(id as usize)?.take()?;
        self.id_by_name.remove(&old.to_lowercase());
        Some(old)
    }

    /// Live sheet ids, ascending.
    pub fn ids(&self) -> impl Iterator<Item = SheetId> + '_ {
        self.name_by_id
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_some())
            .map(|(i, _)| i as SheetId)
    }

    pub fn len(&self) -> usize {
        self.id_by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_by_name.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.name_by_id.iter().filter_map(|n| n.as_deref())
    }
}

impl SheetLookup for SheetMapping {
    fn sheet_id(&self, name: &str) -> Option<SheetId> {
        self.get_id(name)
    }

    fn sheet_name(&self, id: SheetId) -> Option<&str> {
        self.name(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_dense_and_lookup_ignores_case() {
        let mut sheets = SheetMapping::new();
        assert_eq!(sheets.id_for("Sheet1"), 0);
        assert_eq!(sheets.id_for("Data"), 1);
        assert_eq!(sheets.id_for("SHEET1"), 0);
        assert_eq!(sheets.get_id("data"), Some(1));
        assert_eq!(sheets.name(1), Some("Data"));
        assert!(!sheets.contains(2));
        assert_eq!(sheets.names().collect::<Vec<_>>(), vec!["Sheet1", "Data"]);
    }

    #[test]
    fn removed_ids_stay_holes() {
        let mut sheets = SheetMapping::new();
        sheets.id_for("Sheet1");
        sheets.id_for("Data");
        sheets.id_for("Extra");
        assert_eq!(sheets.remove(1), Some("Data".to_string()));
        assert_eq!(sheets.remove(1), None);
        assert!(!sheets.contains(1));
        assert_eq!(sheets.get_id("data"), None);
        assert_eq!(sheets.len(), 2);
        assert_eq!(sheets.ids().collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(sheets.id_for("Data"), 3);

        assert_eq!(sheets.rename(2, "Totals"), Some("Extra".to_string()));
        assert_eq!(sheets.get_id("TOTALS"), Some(2));
        assert_eq!(sheets.get_id("extra"), None);
        assert_eq!(sheets.names().collect::<Vec<_>>(), vec!["Sheet1", "Totals", "Data"]);
    }
}
