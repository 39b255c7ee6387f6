/*! Emitter coverage: method bodies, class units, the metadata unit, linkage and the writer.
 *
 * Programs are built with the core table builders and lowered for real, so the assertions read
 * against the same statements the translator produces for classfiles.
 */

#![allow(unused_imports)]

mod linkage_tests;
mod method_tests;
mod unit_tests;
mod writer_tests;
