use hashbrown::HashMap;
use std::rc::Rc;

/// Scratch map from attribute name to its index in the new tree, reused across attribute diffs.
pub(crate) struct TempAttributeDiffMap(HashMap<Rc<str>, usize>);
impl TempAttributeDiffMap {
	pub fn new() -> Self {
		Self(HashMap::new())
	}

	/// The map is cleared before each borrow, so a diff that bailed out early can't leak names into the next one.
	pub fn temp(&mut self) -> &mut HashMap<Rc<str>, usize> {
		self.0.clear();
		&mut self.0
	}

	pub fn remove(&mut self, name: &str) -> Option<usize> {
		self.0.remove(name)
	}

	/// Empties the map, yielding the indices that were never claimed.
	pub fn drain_indices(&mut self) -> impl Iterator<Item = usize> + '_ {
		self.0.drain().map(|(_, index)| index)
	}

	/// Retrieves the map's capacity without clearing it first.
	pub fn capacity(&self) -> usize {
		self.0.capacity()
	}
}
