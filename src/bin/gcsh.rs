//! gcsh - heap shell
//!
//! Interactive shell (or script runner) for poking at one heap: build
//! integer lists, drop them, collect, and look at the blocks left behind.

use std::collections::BTreeMap;
use std::ptr::NonNull;

use anyhow::{Context as _, Result, bail};
use gcheap::gc::HEAP_SIZE_ENV;
use gcheap::{GlobalSlab, Heap, HeapConfig, List, ObjHeader, SLAB_HEADER_SIZE};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing_subscriber::EnvFilter;

static SQUARES: GlobalSlab<i64, 8> = GlobalSlab::new([0, 1, 4, 9, 16, 25, 36, 49]);

const HELP: &str = "\
commands:
  new <name>              create an empty list
  literal <name>          create a list from the built-in squares literal
  push <name> <int>...    append integers
  pop <name>              remove the last integer
  show [name]             print one list or all of them
  drop <name>             forget a list (its slab becomes garbage)
  gc                      collect, rooted at every live list
  stats                   heap usage
  blocks                  walk the heap block by block
  help                    this text
  quit                    leave";

enum Flow {
    Continue,
    Quit,
}

struct Shell<'h> {
    heap: &'h Heap,
    lists: BTreeMap<String, List<'h, i64>>,
}

impl<'h> Shell<'h> {
    fn new(heap: &'h Heap) -> Self {
        Shell {
            heap,
            lists: BTreeMap::new(),
        }
    }

    fn list_mut(&mut self, name: &str) -> Result<&mut List<'h, i64>> {
        self.lists
            .get_mut(name)
            .with_context(|| format!("no list named {name}"))
    }

    fn insert(&mut self, name: &str, list: List<'h, i64>) -> Result<()> {
        if self.lists.contains_key(name) {
            bail!("list {name} already exists");
        }
        self.lists.insert(name.to_string(), list);
        Ok(())
    }

    fn execute(&mut self, line: &str) -> Result<Flow> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((&command, args)) = words.split_first() else {
            return Ok(Flow::Continue);
        };

        match (command, args) {
            ("new", [name]) => self.insert(name, List::new(self.heap))?,
            ("literal", [name]) => {
                let list = List::from_global(self.heap, &SQUARES)?;
                self.insert(name, list)?;
            }
            ("push", [name, values @ ..]) if !values.is_empty() => {
                let values = values
                    .iter()
                    .map(|v| v.parse::<i64>().with_context(|| format!("not an integer: {v}")))
                    .collect::<Result<Vec<_>>>()?;
                self.list_mut(name)?.extend_from_slice(&values)?;
            }
            ("pop", [name]) => match self.list_mut(name)?.pop() {
                Some(value) => println!("{value}"),
                None => println!("(empty)"),
            },
            ("show", []) => {
                for name in self.lists.keys() {
                    self.show(name)?;
                }
            }
            ("show", [name]) => self.show(name)?,
            ("drop", [name]) => {
                self.lists
                    .remove(*name)
                    .with_context(|| format!("no list named {name}"))?;
            }
            ("gc", []) => self.collect(),
            ("stats", []) => {
                let stats = self.heap.stats();
                println!(
                    "capacity {} | used {} | bump free {} | live {} ({} bytes) | free {} ({} bytes) | allocations {} | collections {}",
                    stats.capacity,
                    stats.heap_used,
                    stats.bump_free,
                    stats.live_blocks,
                    stats.live_bytes,
                    stats.free_blocks,
                    stats.free_list_bytes,
                    stats.allocations,
                    stats.collections,
                );
            }
            ("blocks", []) => {
                let base = self.heap.base() as usize;
                for (ptr, header) in self.heap.iter_blocks() {
                    println!(
                        "{:>8} {:<8} {:>6} x {:<3} {:>8} bytes",
                        ptr.as_ptr() as usize - base,
                        header.tag().to_string(),
                        header.num_items(),
                        header.item_size(),
                        header.block_bytes(),
                    );
                }
            }
            ("help", []) => println!("{HELP}"),
            ("quit" | "exit", []) => return Ok(Flow::Quit),
            _ => bail!("unknown command: {line} (try `help`)"),
        }
        Ok(Flow::Continue)
    }

    fn show(&self, name: &str) -> Result<()> {
        let list = self
            .lists
            .get(name)
            .with_context(|| format!("no list named {name}"))?;
        println!("{name} = {list:?} (len {}, capacity {})", list.len(), list.capacity());
        Ok(())
    }

    fn collect(&self) {
        let roots: Vec<NonNull<ObjHeader>> = self.lists.values().filter_map(List::root).collect();
        // SAFETY: every live list is rooted and no slab borrow is held here
        let stats = unsafe { self.heap.collect(&roots) };
        println!(
            "collected: {} -> {} objects, {} bytes freed, {} bytes returned",
            stats.objects_before, stats.objects_after, stats.bytes_freed, stats.bytes_returned,
        );
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = HeapConfig::from_env().with_context(|| format!("reading {HEAP_SIZE_ENV}"))?;
    let heap = Heap::new(config)?;

    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 {
        // Run a command file
        run_file(&heap, &args[1])
    } else {
        // Interactive shell
        run_repl(&heap)
    }
}

fn run_file(heap: &Heap, filename: &str) -> Result<()> {
    let source =
        std::fs::read_to_string(filename).with_context(|| format!("reading {filename}"))?;

    let mut shell = Shell::new(heap);
    for (number, line) in source.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match shell.execute(line) {
            Ok(Flow::Continue) => {}
            Ok(Flow::Quit) => break,
            Err(e) => {
                eprintln!("{filename}:{}: {e:#}", number + 1);
                std::process::exit(1);
            }
        }
    }
    Ok(())
}

fn run_repl(heap: &Heap) -> Result<()> {
    println!("gcsh - {} byte heap, {} byte slab header", heap.capacity(), SLAB_HEADER_SIZE);
    println!("Type `help` for commands, Ctrl+D to exit.\n");

    let mut shell = Shell::new(heap);
    let mut editor = DefaultEditor::new()?;

    loop {
        match editor.readline("gc> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                editor.add_history_entry(line)?;

                match shell.execute(line) {
                    Ok(Flow::Continue) => {}
                    Ok(Flow::Quit) => break,
                    Err(e) => println!("Error: {e:#}"),
                }
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => {
                println!();
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heap() -> Heap {
        Heap::new(HeapConfig::with_size(16 * 1024)).unwrap()
    }

    #[test]
    fn test_new_push_pop() {
        let heap = heap();
        let mut shell = Shell::new(&heap);

        shell.execute("new a").unwrap();
        shell.execute("push a 1 2 3 4 5").unwrap();
        let list = &shell.lists["a"];
        assert_eq!(list.as_slice(), &[1, 2, 3, 4, 5]);
        assert_eq!(list.capacity(), 8);

        shell.execute("pop a").unwrap();
        assert_eq!(shell.lists["a"].len(), 4);
    }

    #[test]
    fn test_errors() {
        let heap = heap();
        let mut shell = Shell::new(&heap);

        assert!(shell.execute("push missing 1").is_err());
        shell.execute("new a").unwrap();
        assert!(shell.execute("new a").is_err());
        assert!(shell.execute("push a x").is_err());
        assert!(shell.execute("frobnicate").is_err());
    }

    #[test]
    fn test_drop_then_gc() {
        let heap = heap();
        let mut shell = Shell::new(&heap);

        shell.execute("literal sq").unwrap();
        shell.execute("new b").unwrap();
        shell.execute("push b 7").unwrap();
        shell.execute("drop sq").unwrap();
        shell.execute("gc").unwrap();

        let stats = heap.stats();
        assert_eq!(stats.live_blocks, 1);
        assert_eq!(shell.lists["b"].as_slice(), &[7]);
    }

    #[test]
    fn test_quit() {
        let heap = heap();
        let mut shell = Shell::new(&heap);
        assert!(matches!(shell.execute("quit"), Ok(Flow::Quit)));
        assert!(matches!(shell.execute(""), Ok(Flow::Continue)));
    }
}
