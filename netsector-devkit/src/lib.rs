/*!
# NetSector DevKit - Doubles de test et scénarios pour le kernel

Bibliothèque facilitant les tests du moteur de statut sans réseau réel :
- Prober scripté (joignable / injoignable / bloqué, par adresse)
- Store à pannes injectables pour tester le repli de configuration
- Builders de topologie (dont la topologie de l'usine)
- Harness qui assemble un moteur complet et expose des assertions
*/

pub mod fixtures;
pub mod probe_stub;
pub mod test_utils;

pub use fixtures::{plant_topology, TopologyBuilder};
pub use probe_stub::ScriptedProber;
pub use test_utils::{FlakyStore, TestHarness};
