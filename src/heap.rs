// Heap layout policy and symbol tables.
//
// The machine's heap is a flat array of integer cells. The compiler
// carves it into two fixed regions: scalar variables at the bottom,
// arrays above them. Globals fill the scalar region from its base;
// each function's locals stack directly on top of whatever globals
// exist, and are recycled when the function ends. Arrays are packed
// end to end in their own region.

use ron::de::from_reader;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::fs::File;


pub type Result<T> = core::result::Result<T, Error>;


#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    // Scalar region is full. Carries the configured cap.
    TooManyVariables(i64),
    // Array region is full. Carries the configured cap.
    ArrayRegionFull(i64),
    UnknownVariable(String),
    UnknownArray(String),
    BadLayout(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::TooManyVariables(max) => write!(
                f, "variable space exhausted: max_variables = {}", max
            ),
            Error::ArrayRegionFull(max) => write!(
                f, "array space exhausted: max_array = {} cells", max
            ),
            Error::UnknownVariable(name) => write!(
                f, "unknown variable {}", name
            ),
            Error::UnknownArray(name) => write!(
                f, "not a known array: {}", name
            ),
            Error::BadLayout(why) => write!(f, "bad layout: {}", why),
        }
    }
}


// Heap geometry and the reserved prologue width, tunable per program
// the way screen geometry is in a dashboard config.
#[derive(Deserialize, Debug, Copy, Clone, PartialEq)]
#[serde(default)]
pub struct Layout {
    // Characters reserved at the head of the program for the jump
    // over the function block.
    pub function_offset_start: usize,
    pub variable_offset: i64,
    pub max_variables: i64,
    pub array_offset: i64,
    pub max_array: i64,
}

impl Default for Layout {
    fn default() -> Layout {
        Layout {
            function_offset_start: 10,
            variable_offset: 0,
            max_variables: 32,
            array_offset: 32,
            max_array: 128,
        }
    }
}

impl Layout {
    // Regions may be repositioned but never overlap.
    pub fn validate(&self) -> Result<()> {
        if self.function_offset_start < 2 {
            return Err(Error::BadLayout(String::from(
                "function_offset_start leaves no room for the jump"
            )));
        }
        let vars = (self.variable_offset, self.variable_offset + self.max_variables);
        let arrs = (self.array_offset, self.array_offset + self.max_array);
        if vars.0 < arrs.1 && arrs.0 < vars.1 {
            return Err(Error::BadLayout(format!(
                "variable region [{}, {}) overlaps array region [{}, {})",
                vars.0, vars.1, arrs.0, arrs.1
            )));
        }
        Ok(())
    }
}

// Read a layout override from a RON file.
pub fn load_layout(path: &str) -> Result<Layout> {
    let file = File::open(path)
        .map_err(|e| Error::BadLayout(format!("{}: {}", path, e)))?;
    let layout: Layout = from_reader(file)
        .map_err(|e| Error::BadLayout(format!("{}: {}", path, e)))?;
    layout.validate()?;
    Ok(layout)
}


#[derive(Clone, Debug, PartialEq)]
pub struct Array {
    pub offset: i64,
    pub size: i64,
}


// Bump allocation state for globals, locals, and arrays.
pub struct Heap {
    layout: Layout,
    globals: HashMap<String, i64>,
    locals: HashMap<String, i64>,
    arrays: HashMap<String, Array>,
    // Cells handed out from the array region so far.
    arrays_len: i64,
}

impl Heap {
    pub fn new(layout: Layout) -> Heap {
        Heap {
            layout,
            globals: HashMap::new(),
            locals: HashMap::new(),
            arrays: HashMap::new(),
            arrays_len: 0,
        }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    // Allocating a name twice hands back its existing cell: programs
    // assign the same variable many times.
    pub fn alloc_global(&mut self, name: &str) -> Result<i64> {
        if let Some(&offset) = self.globals.get(name) {
            return Ok(offset);
        }
        let offset = self.layout.variable_offset + self.globals.len() as i64;
        if offset >= self.layout.variable_offset + self.layout.max_variables {
            return Err(Error::TooManyVariables(self.layout.max_variables));
        }
        trace!("global {} at heap[{}]", name, offset);
        self.globals.insert(String::from(name), offset);
        Ok(offset)
    }

    // Locals sit immediately above the globals, which therefore must
    // all be allocated before any function is compiled.
    pub fn alloc_local(&mut self, name: &str) -> Result<i64> {
        if let Some(&offset) = self.locals.get(name) {
            return Ok(offset);
        }
        let offset = self.layout.variable_offset
            + self.globals.len() as i64
            + self.locals.len() as i64;
        if offset >= self.layout.variable_offset + self.layout.max_variables {
            return Err(Error::TooManyVariables(self.layout.max_variables));
        }
        trace!("local {} at heap[{}]", name, offset);
        self.locals.insert(String::from(name), offset);
        Ok(offset)
    }

    pub fn alloc_array(&mut self, name: &str, size: i64) -> Result<Array> {
        if let Some(array) = self.arrays.get(name) {
            return Ok(array.clone());
        }
        if self.arrays_len + size > self.layout.max_array {
            return Err(Error::ArrayRegionFull(self.layout.max_array));
        }
        let array = Array {
            offset: self.layout.array_offset + self.arrays_len,
            size,
        };
        trace!("array {} at heap[{}], {} cells", name, array.offset, size);
        self.arrays_len += size;
        self.arrays.insert(String::from(name), array.clone());
        Ok(array)
    }

    // Locals shadow globals of the same name.
    pub fn resolve(&self, name: &str) -> Result<i64> {
        if let Some(&offset) = self.locals.get(name) {
            Ok(offset)
        } else if let Some(&offset) = self.globals.get(name) {
            Ok(offset)
        } else {
            Err(Error::UnknownVariable(String::from(name)))
        }
    }

    pub fn array(&self, name: &str) -> Result<&Array> {
        self.arrays.get(name)
            .ok_or_else(|| Error::UnknownArray(String::from(name)))
    }

    pub fn clear_locals(&mut self) {
        self.locals.clear();
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn heap() -> Heap {
        Heap::new(Layout::default())
    }

    #[test]
    fn test_globals_bump_from_base() {
        let mut h = heap();
        assert_eq!(h.alloc_global("x"), Ok(0));
        assert_eq!(h.alloc_global("y"), Ok(1));
        // Reallocation is idempotent.
        assert_eq!(h.alloc_global("x"), Ok(0));
        assert_eq!(h.resolve("y"), Ok(1));
    }

    #[test]
    fn test_locals_sit_above_globals() {
        let mut h = heap();
        h.alloc_global("g").unwrap();
        h.alloc_global("h").unwrap();
        assert_eq!(h.alloc_local("a"), Ok(2));
        assert_eq!(h.alloc_local("b"), Ok(3));

        h.clear_locals();
        // The next function reuses the same cells.
        assert_eq!(h.alloc_local("c"), Ok(2));
    }

    #[test]
    fn test_local_shadows_global() {
        let mut h = heap();
        h.alloc_global("n").unwrap();
        h.alloc_local("n").unwrap();
        assert_eq!(h.resolve("n"), Ok(1));
        h.clear_locals();
        assert_eq!(h.resolve("n"), Ok(0));
    }

    #[test]
    fn test_variable_capacity() {
        let mut h = Heap::new(Layout {
            max_variables: 2,
            ..Layout::default()
        });
        h.alloc_global("a").unwrap();
        h.alloc_global("b").unwrap();
        assert_eq!(h.alloc_global("c"), Err(Error::TooManyVariables(2)));
        assert_eq!(h.alloc_local("d"), Err(Error::TooManyVariables(2)));
    }

    #[test]
    fn test_arrays_pack_end_to_end() {
        let mut h = heap();
        let a = h.alloc_array("a", 5).unwrap();
        assert_eq!(a, Array { offset: 32, size: 5 });
        let b = h.alloc_array("b", 3).unwrap();
        assert_eq!(b.offset, 37);
        assert_eq!(h.array("a").unwrap().size, 5);
        assert!(h.array("missing").is_err());
    }

    #[test]
    fn test_array_capacity() {
        let mut h = heap();
        h.alloc_array("big", 120).unwrap();
        assert_eq!(h.alloc_array("more", 9), Err(Error::ArrayRegionFull(128)));
        // An exact fit is fine.
        assert!(h.alloc_array("tight", 8).is_ok());
    }

    #[test]
    fn test_unknown_variable() {
        let h = heap();
        assert_eq!(
            h.resolve("nope"),
            Err(Error::UnknownVariable(String::from("nope")))
        );
    }

    #[test]
    fn test_layout_validation() {
        assert!(Layout::default().validate().is_ok());

        let overlapping = Layout {
            array_offset: 16,
            ..Layout::default()
        };
        assert!(overlapping.validate().is_err());

        let cramped = Layout {
            function_offset_start: 1,
            ..Layout::default()
        };
        assert!(cramped.validate().is_err());
    }
}
