use core::hash::{BuildHasherDefault, Hash, Hasher};
use hashbrown::HashMap;
use std::rc::Rc;

/// An attribute name that compares ASCII-case-insensitively.
///
/// Hashing only looks at the first, middle and last byte and the length.
/// Attribute names on one element rarely collide on that, and equality still checks the whole name.
#[derive(Debug, Clone)]
pub(crate) struct AttributeName(pub Rc<str>);
impl PartialEq for AttributeName {
	fn eq(&self, other: &Self) -> bool {
		self.0.eq_ignore_ascii_case(&other.0)
	}
}
impl Eq for AttributeName {}
impl Hash for AttributeName {
	fn hash<H: Hasher>(&self, state: &mut H) {
		state.write_u64(simplified_hash(&self.0));
	}
}

fn simplified_hash(name: &str) -> u64 {
	let bytes = name.as_bytes();
	match (bytes.first(), bytes.get(bytes.len() / 2), bytes.last()) {
		(Some(first), Some(middle), Some(last)) => {
			(u64::from(first.to_ascii_lowercase()) << 48) ^ (u64::from(middle.to_ascii_lowercase()) << 32) ^ (u64::from(last.to_ascii_lowercase()) << 16) ^ bytes.len() as u64
		}
		_ => 0,
	}
}

/// Spreads the already-cheap [`AttributeName`] hash over all bits, so the map's control bytes stay useful.
#[derive(Default)]
pub(crate) struct SimplifiedHasher(u64);
impl Hasher for SimplifiedHasher {
	fn finish(&self) -> u64 {
		self.0.wrapping_mul(0x9E37_79B9_7F4A_7C15)
	}

	fn write(&mut self, bytes: &[u8]) {
		for &byte in bytes {
			self.0 = self.0.rotate_left(8) ^ u64::from(byte);
		}
	}

	fn write_u64(&mut self, value: u64) {
		self.0 ^= value;
	}
}

/// Attribute name to the index of its winning frame (or silent slot) within the current attribute run.
pub(crate) type SeenAttributeNames = HashMap<AttributeName, usize, BuildHasherDefault<SimplifiedHasher>>;
